//! Boot report, the lines logged once after the runtime has come up.
//!
//! The routine itself is platform agnostic; the environment queries and the log output go through
//! the [`Runtime`] and [`LogSink`] traits, the target implementations of those live in `program`.

use core::fmt;

/// Tag that all boot lines are logged under.
pub const LOG_TAG: &str = "main";

/// Reported in place of an empty SDK version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// A single line of the boot report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootLine<'a> {
    /// Fixed startup announcement.
    Startup,
    /// Free heap at the time of the query, in bytes.
    FreeMemory { bytes: u32 },
    /// Version of the platform SDK the firmware was built against.
    SdkVersion(&'a str),
}

impl fmt::Display for BootLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootLine::Startup => write!(f, "Startup..."),
            BootLine::FreeMemory { bytes } => write!(f, "Free memory: {bytes} bytes"),
            BootLine::SdkVersion(version) => write!(f, "SDK version: {version}"),
        }
    }
}

// Same text as Display, but without pulling core::fmt into the defmt path.
impl defmt::Format for BootLine<'_> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            BootLine::Startup => defmt::write!(f, "Startup..."),
            BootLine::FreeMemory { bytes } => defmt::write!(f, "Free memory: {} bytes", *bytes),
            BootLine::SdkVersion(version) => defmt::write!(f, "SDK version: {=str}", *version),
        }
    }
}

/// Queries against the platform runtime.
pub trait Runtime {
    /// Currently unallocated heap memory in bytes.
    fn free_heap_bytes(&self) -> u32;
    /// Identifier of the platform SDK.
    fn sdk_version(&self) -> &str;
}

/// Where the boot lines end up.
pub trait LogSink {
    fn info(&mut self, tag: &str, line: &BootLine<'_>);
}

/// Emit the boot report; startup, free memory, sdk version, in that order.
///
/// Each query is made only after the preceding line is emitted, so the free memory reflects the
/// state after the startup line went out.
pub fn report_boot<R: Runtime, S: LogSink>(runtime: &R, sink: &mut S) {
    sink.info(LOG_TAG, &BootLine::Startup);

    let bytes = runtime.free_heap_bytes();
    sink.info(LOG_TAG, &BootLine::FreeMemory { bytes });

    let version = match runtime.sdk_version() {
        "" => UNKNOWN_VERSION,
        v => v,
    };
    sink.info(LOG_TAG, &BootLine::SdkVersion(version));
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        QueryHeap,
        QueryVersion,
        Line { tag: String, text: String },
    }

    type Events = Rc<RefCell<Vec<Event>>>;

    struct FakeRuntime {
        free: u32,
        version: &'static str,
        events: Events,
    }

    impl Runtime for FakeRuntime {
        fn free_heap_bytes(&self) -> u32 {
            self.events.borrow_mut().push(Event::QueryHeap);
            self.free
        }
        fn sdk_version(&self) -> &str {
            self.events.borrow_mut().push(Event::QueryVersion);
            self.version
        }
    }

    struct RecordingSink {
        events: Events,
    }

    impl LogSink for RecordingSink {
        fn info(&mut self, tag: &str, line: &BootLine<'_>) {
            self.events.borrow_mut().push(Event::Line {
                tag: tag.to_string(),
                text: line.to_string(),
            });
        }
    }

    fn run(free: u32, version: &'static str) -> Vec<Event> {
        let events: Events = Default::default();
        let runtime = FakeRuntime {
            free,
            version,
            events: events.clone(),
        };
        let mut sink = RecordingSink {
            events: events.clone(),
        };
        report_boot(&runtime, &mut sink);
        let r = events.borrow().clone();
        r
    }

    fn lines(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Line { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_three_lines_in_order() {
        let events = run(123456, "embassy-rp 0.6.0");
        assert_eq!(
            lines(&events),
            vec![
                "Startup...".to_string(),
                "Free memory: 123456 bytes".to_string(),
                "SDK version: embassy-rp 0.6.0".to_string(),
            ]
        );
        for e in events.iter() {
            if let Event::Line { tag, .. } = e {
                assert_eq!(tag, LOG_TAG);
            }
        }
    }

    #[test]
    fn test_queries_interleave_with_lines() {
        // Heap is queried after the startup line, nothing happens after the version line.
        let events = run(0, "v1");
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], Event::Line { .. }));
        assert_eq!(events[1], Event::QueryHeap);
        assert!(matches!(events[2], Event::Line { .. }));
        assert_eq!(events[3], Event::QueryVersion);
        assert!(matches!(events[4], Event::Line { .. }));
    }

    #[test]
    fn test_heap_extremes() {
        let events = run(0, "v1");
        assert_eq!(lines(&events)[1], "Free memory: 0 bytes");
        let events = run(u32::MAX, "v1");
        assert_eq!(lines(&events)[1], "Free memory: 4294967295 bytes");
    }

    #[test]
    fn test_empty_version_is_reported_as_unknown() {
        let events = run(10, "");
        assert_eq!(lines(&events)[2], "SDK version: unknown");
    }

    #[test]
    fn test_display() {
        assert_eq!(BootLine::Startup.to_string(), "Startup...");
        assert_eq!(
            BootLine::FreeMemory { bytes: 42 }.to_string(),
            "Free memory: 42 bytes"
        );
        assert_eq!(
            BootLine::SdkVersion("x").to_string(),
            "SDK version: x"
        );
    }
}
