use crate::prelude::*;
use crate::error::DeviceError;

use crate::voltronic::channel::DeviceChannel;
use crate::voltronic::device::Device;

/// Writes POP00/POP02. The inverter sends nothing back worth reading, so
/// there is no reply handling; whoever asked announces the desired mode.
pub struct SetMode<'a, D: Device> {
    channel: &'a mut DeviceChannel<D>,
    target: ModeTarget,
}

impl<'a, D: Device> SetMode<'a, D> {
    pub fn new(channel: &'a mut DeviceChannel<D>, target: ModeTarget) -> Self {
        Self { channel, target }
    }

    pub fn run(self) -> Result<(), DeviceError> {
        let command = self.target.frame();

        self.channel.open()?;
        self.channel.flush();
        self.channel.send(&command)?;

        info!("sent {} (mode {:?})", command, self.target);
        Ok(())
    }
}
