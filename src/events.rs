use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

use crate::enums::RepresentationType;

/// Notifications published to the UI/command layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationEvent {
    SegmentationAdded {
        segmentation_id: String,
    },
    SegmentationUpdated {
        segmentation_id: String,
    },
    SegmentationRemoved {
        segmentation_id: String,
    },
    SegmentationDataModified {
        segmentation_id: String,
        /// Axial slices whose voxels changed, if known.
        touched_slices: Vec<usize>,
    },
    SegmentationConfigurationChanged {
        representation_type: RepresentationType,
    },
    SegmentLoadingComplete {
        segmentation_id: String,
        segment_index: u32,
        percent_complete: u8,
    },
    SegmentationLoadingComplete {
        segmentation_id: String,
    },
}

impl SegmentationEvent {
    pub fn segmentation_id(&self) -> Option<&str> {
        match self {
            SegmentationEvent::SegmentationAdded { segmentation_id }
            | SegmentationEvent::SegmentationUpdated { segmentation_id }
            | SegmentationEvent::SegmentationRemoved { segmentation_id }
            | SegmentationEvent::SegmentationDataModified {
                segmentation_id, ..
            }
            | SegmentationEvent::SegmentLoadingComplete {
                segmentation_id, ..
            }
            | SegmentationEvent::SegmentationLoadingComplete { segmentation_id } => {
                Some(segmentation_id)
            }
            SegmentationEvent::SegmentationConfigurationChanged { .. } => None,
        }
    }
}

/// Fan-out of [`SegmentationEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<UnboundedSender<SegmentationEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> UnboundedReceiver<SegmentationEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn emit(&mut self, event: SegmentationEvent) {
        log::trace!("Emitting {event:?}");
        self.subscribers
            .retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Detached handle reaching the current subscribers.
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

/// Sends events to a snapshot of an [`EventBus`]'s subscribers without
/// borrowing the bus. Later subscribers are not reached.
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    subscribers: Vec<UnboundedSender<SegmentationEvent>>,
}

impl EventPublisher {
    pub fn emit(&self, event: &SegmentationEvent) {
        log::trace!("Publishing {event:?}");
        for subscriber in &self.subscribers {
            // A dropped receiver is pruned by the bus on its next emit.
            let _ = subscriber.unbounded_send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events() {
        let mut bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(SegmentationEvent::SegmentationAdded {
            segmentation_id: "s1".into(),
        });

        for receiver in [&mut first, &mut second] {
            let event = receiver.try_next().unwrap().unwrap();
            assert_eq!(event.segmentation_id(), Some("s1"));
        }
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = EventBus::new();
        let receiver = bus.subscribe();
        let _kept = bus.subscribe();
        drop(receiver);

        bus.emit(SegmentationEvent::SegmentationConfigurationChanged {
            representation_type: RepresentationType::Labelmap,
        });

        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publisher_reaches_subscribers_known_when_it_was_made() {
        let mut bus = EventBus::new();
        let mut early = bus.subscribe();
        let publisher = bus.publisher();
        let mut late = bus.subscribe();

        publisher.emit(&SegmentationEvent::SegmentationLoadingComplete {
            segmentation_id: "s1".into(),
        });

        assert!(early.try_next().unwrap().is_some());
        assert!(late.try_next().is_err());
    }
}
