//! Byte transport collaborator

use crate::Result;

/// Bidirectional byte link to a device
///
/// Implementations own their timing: a serial port blocks until bytes
/// arrive, a timed replay sleeps until the recorded arrival time.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Read up to `max` bytes
    ///
    /// Returns:
    /// - non-empty bytes on success (partial reads are allowed)
    /// - an empty vector when the stream has ended (normal termination)
    /// - `Err(e)` when the link failed
    async fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Write bytes to the device, best effort
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

#[async_trait::async_trait]
impl Transport for Box<dyn Transport> {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        (**self).read(max).await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes).await
    }
}
