// device/host.rs — Device memory emulated in host RAM.

use super::DeviceMemory;
use crate::error::Result;

pub(crate) struct HostMemory {
    bytes: Vec<u8>,
}

impl HostMemory {
    pub(crate) fn new(len: usize) -> Self {
        HostMemory { bytes: vec![0u8; len] }
    }
}

impl DeviceMemory for HostMemory {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}
