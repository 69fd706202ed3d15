//! USB side: locating, claiming and reading the pedal
//!
//! The pedal enumerates as a HID device, so on Linux the kernel `usbhid`
//! driver normally owns interface 0. [`PedalDevice::claim`] detaches it for
//! the session and [`PedalDevice::release`] hands it back; a device left
//! detached stays unusable until it is replugged. The bookkeeping for both
//! lives in [`InterfaceLease`].

use crate::ports::{ClaimableSource, ReadOutcome, ReportSource};
use crate::{BridgeError, BridgeResult};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interface and alternate setting the pedal reports on.
pub const PEDAL_INTERFACE: u8 = 0;
pub const PEDAL_ALT_SETTING: u8 = 0;

/// The IN endpoint reports are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEndpoint {
    pub address: u8,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

/// One attached USB device, as shown by `footpedald list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// The handle operations claiming and releasing need.
///
/// Implemented for `rusb::DeviceHandle`; kept as a trait so the claim and
/// release sequencing can run against a fake handle.
pub trait InterfaceControl {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;
}

impl<T: UsbContext> InterfaceControl for DeviceHandle<T> {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, interface)
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, interface)
    }
}

/// What this session took from the kernel, and whether it was given back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLease {
    interface: u8,
    claimed: bool,
    detached_kernel_driver: bool,
    released: bool,
}

impl InterfaceLease {
    pub fn new(interface: u8) -> Self {
        Self {
            interface,
            claimed: false,
            detached_kernel_driver: false,
            released: false,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Detaches the kernel driver if one is bound, then claims the interface.
    ///
    /// A second call is a no-op. If the claim fails after a detach, the
    /// driver is attached again before the error is returned.
    pub fn claim<H: InterfaceControl>(&mut self, handle: &mut H) -> BridgeResult<()> {
        if self.claimed {
            return Ok(());
        }

        match handle.kernel_driver_active(self.interface) {
            Ok(true) => {
                handle
                    .detach_kernel_driver(self.interface)
                    .map_err(|e| BridgeError::access("detach kernel driver", e))?;
                self.detached_kernel_driver = true;
                debug!(interface = self.interface, "Detached kernel driver");
            }
            Ok(false) | Err(rusb::Error::NotSupported) => {}
            Err(e) => return Err(BridgeError::access("query kernel driver", e)),
        }

        if let Err(e) = handle.claim_interface(self.interface) {
            self.reattach_kernel_driver(handle);
            return Err(BridgeError::access("claim interface", e));
        }

        self.claimed = true;
        info!(interface = self.interface, "Claimed pedal interface");
        Ok(())
    }

    /// Releases the interface and gives the kernel driver back.
    ///
    /// Runs its work once; later calls return `Ok(())`. Both steps are tried
    /// even if the first fails, and the first failure is returned.
    pub fn release<H: InterfaceControl>(&mut self, handle: &mut H) -> BridgeResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_error = None;
        if self.claimed {
            self.claimed = false;
            match handle.release_interface(self.interface) {
                Ok(()) => debug!(interface = self.interface, "Released pedal interface"),
                Err(e) => {
                    warn!(interface = self.interface, error = %e, "Failed to release interface");
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = self.reattach_kernel_driver(handle) {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(BridgeError::Release(e)),
            None => {
                info!("Foot pedal handed back to the kernel");
                Ok(())
            }
        }
    }

    fn reattach_kernel_driver<H: InterfaceControl>(&mut self, handle: &mut H) -> Option<rusb::Error> {
        if !self.detached_kernel_driver {
            return None;
        }
        self.detached_kernel_driver = false;
        match handle.attach_kernel_driver(self.interface) {
            Ok(()) => {
                debug!(interface = self.interface, "Re-attached kernel driver");
                None
            }
            Err(e) => {
                warn!(interface = self.interface, error = %e, "Failed to re-attach kernel driver");
                Some(e)
            }
        }
    }
}

pub struct PedalDevice {
    handle: DeviceHandle<Context>,
    endpoint: InputEndpoint,
    lease: InterfaceLease,
}

impl PedalDevice {
    /// Opens the first device matching `vendor_id:product_id`.
    pub fn open(vendor_id: u16, product_id: u16) -> BridgeResult<Self> {
        let context = Context::new().map_err(BridgeError::Transport)?;
        let device = find_device(&context, vendor_id, product_id)?
            .ok_or(BridgeError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        let endpoint = find_input_endpoint(&device, PEDAL_INTERFACE)?;
        let handle = device.open().map_err(|e| match e {
            rusb::Error::Access => BridgeError::access("open device", e),
            rusb::Error::NoDevice | rusb::Error::NotFound => BridgeError::DeviceNotFound {
                vendor_id,
                product_id,
            },
            other => BridgeError::Transport(other),
        })?;

        info!(
            vendor_id = format_args!("{vendor_id:#06x}"),
            product_id = format_args!("{product_id:#06x}"),
            bus = device.bus_number(),
            address = device.address(),
            endpoint = format_args!("{:#04x}", endpoint.address),
            max_packet_size = endpoint.max_packet_size,
            "Opened foot pedal"
        );

        Ok(Self {
            handle,
            endpoint,
            lease: InterfaceLease::new(PEDAL_INTERFACE),
        })
    }

    pub fn endpoint(&self) -> InputEndpoint {
        self.endpoint
    }

    /// See [`InterfaceLease::claim`].
    pub fn claim(&mut self) -> BridgeResult<()> {
        self.lease.claim(&mut self.handle)
    }

    /// Blocks for one report or until `timeout` passes.
    pub fn read(&mut self, timeout: Duration) -> BridgeResult<ReadOutcome> {
        let mut buf = vec![0u8; usize::from(self.endpoint.max_packet_size.max(1))];
        let result = match self.endpoint.transfer_type {
            TransferType::Bulk => self.handle.read_bulk(self.endpoint.address, &mut buf, timeout),
            _ => self
                .handle
                .read_interrupt(self.endpoint.address, &mut buf, timeout),
        };

        match result {
            Ok(len) => {
                buf.truncate(len);
                Ok(ReadOutcome::Report(buf))
            }
            Err(rusb::Error::Timeout) => Ok(ReadOutcome::Timeout),
            Err(e) => Err(BridgeError::Transport(e)),
        }
    }

    /// See [`InterfaceLease::release`].
    pub fn release(&mut self) -> BridgeResult<()> {
        self.lease.release(&mut self.handle)
    }
}

impl ReportSource for PedalDevice {
    fn read_report(&mut self, timeout: Duration) -> BridgeResult<ReadOutcome> {
        self.read(timeout)
    }

    fn release(&mut self) -> BridgeResult<()> {
        PedalDevice::release(self)
    }
}

impl ClaimableSource for PedalDevice {
    fn claim(&mut self) -> BridgeResult<()> {
        PedalDevice::claim(self)
    }
}

impl Drop for PedalDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Release on drop failed");
        }
    }
}

/// Every USB device on the host, for the `list` command.
pub fn list_devices() -> BridgeResult<Vec<UsbDeviceSummary>> {
    let context = Context::new().map_err(BridgeError::Transport)?;
    let devices = context.devices().map_err(BridgeError::Transport)?;

    let mut summaries = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(bus = device.bus_number(), address = device.address(), error = %e, "Skipping unreadable device");
                continue;
            }
        };
        summaries.push(UsbDeviceSummary {
            bus: device.bus_number(),
            address: device.address(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
        });
    }
    Ok(summaries)
}

fn find_device(
    context: &Context,
    vendor_id: u16,
    product_id: u16,
) -> BridgeResult<Option<Device<Context>>> {
    let devices = context.devices().map_err(BridgeError::Transport)?;
    Ok(devices.iter().find(|device| {
        device
            .device_descriptor()
            .map(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .unwrap_or(false)
    }))
}

/// First interrupt or bulk IN endpoint on `interface`, alternate setting 0.
fn find_input_endpoint(device: &Device<Context>, interface: u8) -> BridgeResult<InputEndpoint> {
    let config = device.active_config_descriptor().map_err(|e| match e {
        rusb::Error::Access => BridgeError::access("read config descriptor", e),
        other => BridgeError::Transport(other),
    })?;

    for candidate in config.interfaces() {
        if candidate.number() != interface {
            continue;
        }
        for setting in candidate.descriptors() {
            if setting.setting_number() != PEDAL_ALT_SETTING {
                continue;
            }
            for endpoint in setting.endpoint_descriptors() {
                let transfer_type = endpoint.transfer_type();
                if endpoint.direction() == Direction::In
                    && matches!(transfer_type, TransferType::Interrupt | TransferType::Bulk)
                {
                    return Ok(InputEndpoint {
                        address: endpoint.address(),
                        transfer_type,
                        max_packet_size: endpoint.max_packet_size(),
                    });
                }
            }
        }
    }

    Err(BridgeError::EndpointNotFound { interface })
}
