pub mod config;
pub mod debounce;
pub mod game_state;
pub mod gateway;
pub mod geometry;
pub mod input;
pub mod net;
pub mod pause;
pub mod record;
pub mod reducer;
pub mod session;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};

    use crate::game_state::GameState;
    use crate::gateway::{GatewayError, SessionHandle, SyncGateway};
    use crate::geometry::Point;
    use crate::record::{RecordField, SessionFields};

    /// One call observed by [`RecordingGateway`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GatewayCall {
        Create {
            player_id: String,
            handle: SessionHandle,
        },
        Update {
            handle: SessionHandle,
            fields: SessionFields,
        },
        Fallback {
            handle: SessionHandle,
            fields: SessionFields,
        },
        CancelFallback(SessionHandle),
        SetField {
            handle: SessionHandle,
            field: RecordField,
        },
        SetFruit(Point),
    }

    /// In-process gateway that records every write for assertions.
    #[derive(Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<GatewayCall>>,
        fruit: Mutex<Option<Point>>,
        fail_writes: AtomicBool,
    }

    impl RecordingGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed the shared fruit without recording a call.
        pub fn place_fruit(&self, position: Point) {
            *self.fruit.lock().unwrap_or_else(PoisonError::into_inner) = Some(position);
        }

        pub fn fruit(&self) -> Option<Point> {
            *self.fruit.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Make every subsequent write fail with `Unavailable` (still recorded).
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Fields of every `update` call, in order.
        pub fn updates(&self) -> Vec<SessionFields> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    GatewayCall::Update { fields, .. } => Some(fields),
                    _ => None,
                })
                .collect()
        }

        /// Number of forced `ended` writes for `handle`.
        pub fn finalizations(&self, handle: &SessionHandle) -> usize {
            self.calls()
                .iter()
                .filter(|c| {
                    matches!(
                        c,
                        GatewayCall::SetField {
                            handle: h,
                            field: RecordField::State(GameState::Ended),
                        } if h == handle
                    )
                })
                .count()
        }

        /// Every call that targets `handle`, in order.
        pub fn calls_for(&self, handle: &SessionHandle) -> Vec<GatewayCall> {
            self.calls()
                .into_iter()
                .filter(|c| match c {
                    GatewayCall::Create { handle: h, .. }
                    | GatewayCall::Update { handle: h, .. }
                    | GatewayCall::Fallback { handle: h, .. }
                    | GatewayCall::SetField { handle: h, .. } => h == handle,
                    GatewayCall::CancelFallback(h) => h == handle,
                    GatewayCall::SetFruit(_) => false,
                })
                .collect()
        }

        fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(GatewayError::Unavailable("writes disabled".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl SyncGateway for RecordingGateway {
        fn create_session(&self, player_id: &str) -> SessionHandle {
            let handle = SessionHandle::generate();
            let _ = self.record(GatewayCall::Create {
                player_id: player_id.to_string(),
                handle: handle.clone(),
            });
            handle
        }

        fn update(&self, handle: &SessionHandle, fields: SessionFields) -> Result<(), GatewayError> {
            self.record(GatewayCall::Update {
                handle: handle.clone(),
                fields,
            })
        }

        fn register_disconnect_fallback(
            &self,
            handle: &SessionHandle,
            fields: SessionFields,
        ) -> Result<(), GatewayError> {
            self.record(GatewayCall::Fallback {
                handle: handle.clone(),
                fields,
            })
        }

        fn cancel_disconnect_fallback(&self, handle: &SessionHandle) -> Result<(), GatewayError> {
            self.record(GatewayCall::CancelFallback(handle.clone()))
        }

        fn set_field(&self, handle: &SessionHandle, field: RecordField) -> Result<(), GatewayError> {
            self.record(GatewayCall::SetField {
                handle: handle.clone(),
                field,
            })
        }

        fn set_fruit_position(&self, position: Point) -> Result<(), GatewayError> {
            self.record(GatewayCall::SetFruit(position))?;
            self.place_fruit(position);
            Ok(())
        }

        fn read_fruit_position(&self) -> Option<Point> {
            self.fruit()
        }
    }
}
