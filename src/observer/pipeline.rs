use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

use crate::observer::error::ObserverError;
use crate::observer::event::ForumEvent;
use crate::observer::traits::{EventObserver, ObserverRing};

/// What happened while dispatching one event and its follow-ups
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub executed: usize,
    pub failures: Vec<(&'static str, ObserverError)>,
}

/// Runs registered observers ring by ring for every emitted event
pub struct ObserverPipeline {
    observers: BTreeMap<ObserverRing, Vec<Box<dyn EventObserver>>>,
    max_recursion_depth: usize,
    detached: bool,
}

impl ObserverPipeline {
    /// Pipeline whose `emit` spawns dispatch in the background
    pub fn new() -> Self {
        Self {
            observers: BTreeMap::new(),
            max_recursion_depth: 3,
            detached: true,
        }
    }

    /// `emit` awaits dispatch instead of spawning it. Used by the CLI, which
    /// exits as soon as its command returns.
    pub fn inline(mut self) -> Self {
        self.detached = false;
        self
    }

    pub fn register_observer(&mut self, observer: Box<dyn EventObserver>) {
        let ring = observer.ring();
        let name = observer.name();
        let ring_observers = self.observers.entry(ring).or_default();
        ring_observers.push(observer);
        ring_observers.sort_by_key(|o| o.priority());

        tracing::debug!("Registered observer '{}' for ring {:?}", name, ring);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.values().map(Vec::len).sum()
    }

    /// Hand an event to the observers once its write has committed
    pub async fn emit(self: &Arc<Self>, event: ForumEvent) {
        if self.detached {
            let pipeline = Arc::clone(self);
            tokio::spawn(async move {
                pipeline.dispatch(event).await;
            });
        } else {
            self.dispatch(event).await;
        }
    }

    /// Run every applicable observer for `event`, then for the follow-up
    /// events they return. Failures and timeouts are logged and collected.
    pub async fn dispatch(&self, event: ForumEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut queue = VecDeque::from([(event, 0usize)]);

        while let Some((event, depth)) = queue.pop_front() {
            if depth > self.max_recursion_depth {
                let error = ObserverError::RecursionError {
                    depth,
                    max_depth: self.max_recursion_depth,
                };
                tracing::error!("Dropping {:?} event: {}", event.kind(), error);
                report.failures.push(("pipeline", error));
                continue;
            }

            let kind = event.kind();
            tracing::debug!("Observer pipeline dispatching {:?} at depth {}", kind, depth);

            for (ring, observers) in &self.observers {
                for observer in observers.iter().filter(|o| o.applies_to(kind)) {
                    let observer_start = Instant::now();
                    let result = timeout(observer.timeout(), observer.execute(&event)).await;
                    let execution_time = observer_start.elapsed();

                    match result {
                        Ok(Ok(follow_ups)) => {
                            tracing::debug!(
                                "Observer: {} ({:?}) completed in {:?} with {} follow-up events",
                                observer.name(),
                                ring,
                                execution_time,
                                follow_ups.len()
                            );
                            report.executed += 1;
                            queue.extend(follow_ups.into_iter().map(|e| (e, depth + 1)));
                        }
                        Ok(Err(error)) => {
                            tracing::warn!(
                                "Observer: {} failed in {:?}: {}",
                                observer.name(),
                                execution_time,
                                error
                            );
                            report.failures.push((observer.name(), error));
                        }
                        Err(_elapsed) => {
                            let error = ObserverError::TimeoutError(format!(
                                "Observer {} timed out after {:?}",
                                observer.name(),
                                observer.timeout()
                            ));
                            tracing::error!("{}", error);
                            report.failures.push((observer.name(), error));
                        }
                    }
                }
            }
        }

        report
    }
}

impl Default for ObserverPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::event::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Recorder {
        name: &'static str,
        ring: ObserverRing,
        log: Log,
        behaviour: Behaviour,
    }

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
        /// Re-emit the same like event forever
        Echo,
    }

    #[async_trait]
    impl EventObserver for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn ring(&self) -> ObserverRing {
            self.ring
        }

        fn applies_to(&self, kind: EventKind) -> bool {
            kind == EventKind::PostLiked
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn execute(&self, event: &ForumEvent) -> Result<Vec<ForumEvent>, ObserverError> {
            self.log.lock().unwrap().push(self.name);
            match self.behaviour {
                Behaviour::Succeed => Ok(vec![]),
                Behaviour::Fail => Err(ObserverError::ServiceError("boom".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(vec![])
                }
                Behaviour::Echo => Ok(vec![event.clone()]),
            }
        }
    }

    fn recorder(name: &'static str, ring: ObserverRing, log: &Log, behaviour: Behaviour) -> Box<dyn EventObserver> {
        Box::new(Recorder {
            name,
            ring,
            log: log.clone(),
            behaviour,
        })
    }

    fn liked() -> ForumEvent {
        ForumEvent::PostLiked {
            post_id: Uuid::new_v4(),
            post_author_id: Uuid::new_v4(),
            liker_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn runs_rings_in_order() {
        let log: Log = Arc::default();
        let mut pipeline = ObserverPipeline::new();
        pipeline.register_observer(recorder("notify", ObserverRing::Notification, &log, Behaviour::Succeed));
        pipeline.register_observer(recorder("audit", ObserverRing::Audit, &log, Behaviour::Succeed));
        pipeline.register_observer(recorder("trophies", ObserverRing::Integration, &log, Behaviour::Succeed));

        let report = pipeline.dispatch(liked()).await;
        assert_eq!(report.executed, 3);
        assert_eq!(*log.lock().unwrap(), vec!["audit", "trophies", "notify"]);
    }

    #[tokio::test]
    async fn failures_and_timeouts_do_not_stop_later_observers() {
        let log: Log = Arc::default();
        let mut pipeline = ObserverPipeline::new();
        pipeline.register_observer(recorder("broken", ObserverRing::Audit, &log, Behaviour::Fail));
        pipeline.register_observer(recorder("slow", ObserverRing::Integration, &log, Behaviour::Hang));
        pipeline.register_observer(recorder("notify", ObserverRing::Notification, &log, Behaviour::Succeed));

        let report = pipeline.dispatch(liked()).await;
        assert_eq!(report.executed, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[1].1, ObserverError::TimeoutError(_)));
        assert_eq!(log.lock().unwrap().last(), Some(&"notify"));
    }

    #[tokio::test]
    async fn follow_up_events_are_bounded() {
        let log: Log = Arc::default();
        let mut pipeline = ObserverPipeline::new();
        pipeline.register_observer(recorder("echo", ObserverRing::Integration, &log, Behaviour::Echo));

        let report = pipeline.dispatch(liked()).await;
        // depth 0..=3 run, depth 4 is dropped
        assert_eq!(report.executed, 4);
        assert!(matches!(
            report.failures.as_slice(),
            [("pipeline", ObserverError::RecursionError { depth: 4, max_depth: 3 })]
        ));
    }

    #[tokio::test]
    async fn inline_emit_completes_before_returning() {
        let log: Log = Arc::default();
        let mut pipeline = ObserverPipeline::new().inline();
        pipeline.register_observer(recorder("audit", ObserverRing::Audit, &log, Behaviour::Succeed));
        let pipeline = Arc::new(pipeline);

        pipeline.emit(liked()).await;
        assert_eq!(*log.lock().unwrap(), vec!["audit"]);
    }
}
