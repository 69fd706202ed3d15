//! Virtual keyboard sink backed by Linux uinput

use crate::ports::KeySink;
use crate::{BridgeError, BridgeResult};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use footpedal_protocol::{EdgeEvent, KEY_CODE_LIMIT, KeyBindingMap};
use tracing::{debug, info};

pub const DEFAULT_DEVICE_NAME: &str = "VEC Footpedal Keyboard";

/// A uinput keyboard that only advertises the bound keys.
pub struct VirtualKeyboard {
    device: VirtualDevice,
    name: String,
}

impl VirtualKeyboard {
    pub fn create(name: &str, bindings: &KeyBindingMap) -> BridgeResult<Self> {
        let keys = advertised_keys(bindings)?;
        let device = VirtualDeviceBuilder::new()
            .map_err(BridgeError::VirtualDevice)?
            .name(name)
            .with_keys(&keys)
            .map_err(BridgeError::VirtualDevice)?
            .build()
            .map_err(BridgeError::VirtualDevice)?;

        info!(name, keys = bindings.key_codes().len(), "Created virtual keyboard");
        Ok(Self {
            device,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The key set the keyboard advertises: every bound code, each checked
/// against the size of evdev's key bitset before insertion.
pub fn advertised_keys(bindings: &KeyBindingMap) -> BridgeResult<AttributeSet<Key>> {
    let mut keys = AttributeSet::<Key>::new();
    for code in bindings.key_codes() {
        if code >= KEY_CODE_LIMIT {
            return Err(BridgeError::Config(format!(
                "key code {code} cannot be advertised (must be below {KEY_CODE_LIMIT:#x})"
            )));
        }
        keys.insert(Key::new(code));
    }
    Ok(keys)
}

impl KeySink for VirtualKeyboard {
    /// `VirtualDevice::emit` terminates the batch with `SYN_REPORT`, so each
    /// edge reaches readers as its own complete frame.
    fn emit(&mut self, edge: &EdgeEvent) -> BridgeResult<()> {
        let event = InputEvent::new(EventType::KEY, edge.key, edge.level());
        self.device.emit(&[event]).map_err(BridgeError::Emit)?;
        debug!(pedal = %edge.pedal, key = edge.key, value = edge.level(), "Emitted key event");
        Ok(())
    }
}
