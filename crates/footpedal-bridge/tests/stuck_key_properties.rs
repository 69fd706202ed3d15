//! Property tests: whatever the pedal does, no key is left down.

use footpedal_bridge::ports::mock::{MockKeySink, MockRead, MockReportSource};
use footpedal_bridge::{PollLoop, ShutdownSignal};
use footpedal_protocol::{KeyBindingMap, Pedal};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

fn read_strategy() -> impl Strategy<Value = MockRead> {
    prop_oneof![
        6 => proptest::collection::vec(any::<u8>(), 0..6).prop_map(MockRead::Report),
        2 => Just(MockRead::Timeout),
        1 => Just(MockRead::TransportError(rusb::Error::Io)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Presses and releases alternate per pedal and every press is lifted by the end.
    #[test]
    fn prop_every_press_is_released(script in proptest::collection::vec(read_strategy(), 0..40)) {
        let shutdown = ShutdownSignal::new();
        let source = MockReportSource::with_script(shutdown.clone(), script);
        let releases = source.release_counter();
        let sink = MockKeySink::new();
        let history = sink.history();

        let mut poll_loop = PollLoop::new(
            source,
            sink,
            KeyBindingMap::default(),
            Duration::from_millis(1),
            shutdown,
        );
        let summary = poll_loop.run();
        prop_assert!(matches!(summary, Ok(_)), "run failed: {:?}", summary.err());

        let mut down: BTreeMap<Pedal, bool> = BTreeMap::new();
        for edge in history.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            let was_down = down.insert(edge.pedal, edge.pressed).unwrap_or(false);
            prop_assert_ne!(was_down, edge.pressed, "repeated level for {}", edge.pedal);
        }
        prop_assert!(down.values().all(|pressed| !pressed), "stuck keys: {:?}", down);
        prop_assert_eq!(*releases.lock().unwrap_or_else(|e| e.into_inner()), 1);
    }
}
