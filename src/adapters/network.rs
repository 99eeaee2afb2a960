//! Network adapter: the WiFi link and the telemetry client as one value.
//!
//! [`DeviceRuntime::tick`](crate::app::service::DeviceRuntime::tick) takes
//! connectivity and telemetry through a single `&mut`, so the two adapters
//! are paired here.

use crate::app::ports::{ConnectivityPort, Point, TelemetryPort};

pub struct NetworkAdapter<C, T> {
    pub link: C,
    pub telemetry: T,
}

impl<C: ConnectivityPort, T: TelemetryPort> NetworkAdapter<C, T> {
    pub fn new(link: C, telemetry: T) -> Self {
        Self { link, telemetry }
    }
}

impl<C: ConnectivityPort, T> ConnectivityPort for NetworkAdapter<C, T> {
    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn request_portal(&mut self, start: bool) {
        self.link.request_portal(start);
    }

    fn process_portal(&mut self) {
        self.link.process_portal();
    }
}

impl<C, T: TelemetryPort> TelemetryPort for NetworkAdapter<C, T> {
    fn write(&mut self, point: &Point) -> bool {
        self.telemetry.write(point)
    }
}
