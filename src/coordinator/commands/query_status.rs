use crate::prelude::*;

use crate::voltronic::channel::DeviceChannel;
use crate::voltronic::device::Device;
use crate::voltronic::frame::{self, Request};

pub struct QueryStatus<'a, D: Device> {
    channel: &'a mut DeviceChannel<D>,
}

impl<'a, D: Device> QueryStatus<'a, D> {
    pub fn new(channel: &'a mut DeviceChannel<D>) -> Self {
        Self { channel }
    }

    pub fn run(self) -> Result<StatusRecord> {
        let command = frame::build_command(Request::GeneralStatus);

        let reply = self
            .channel
            .send_and_read(&command, |channel, settings| {
                channel.read_until_terminator(settings.timeout, settings.poll_interval)
            })
            .ok_or_else(|| anyhow!("{}: no valid reply", command))?;

        let status = StatusRecord::from_frame(&reply)
            .map_err(|err| anyhow!("{}: {} in {:?}", command, err, reply))?;

        debug!(
            "{}: battery {}% {}V, solar {}W, load {}W",
            command, status.battery_capacity, status.battery_voltage, status.solar_power, status.load_w
        );

        Ok(status)
    }
}
