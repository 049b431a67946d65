use crate::prelude::*;

use crate::voltronic::channel::DeviceChannel;
use crate::voltronic::device::Device;
use crate::voltronic::frame::{self, Request};

pub struct QueryMode<'a, D: Device> {
    channel: &'a mut DeviceChannel<D>,
}

impl<'a, D: Device> QueryMode<'a, D> {
    pub fn new(channel: &'a mut DeviceChannel<D>) -> Self {
        Self { channel }
    }

    /// `None` covers both "no reply" and "a reply we don't understand".
    pub fn run(self) -> Option<OperatingMode> {
        let command = frame::build_command(Request::ModeInquiry);

        self.channel
            .send_and_read(&command, |channel, settings| {
                channel.read_mode_reply(settings.timeout, settings.poll_interval)
            })
            .flatten()
    }
}
