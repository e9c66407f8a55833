//! Recognition events and the bus that fans them out to subscribers

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, HandlerId};
pub use types::{
    CancellationDetails, CancellationErrorCode, CancellationReason, CanceledNotice, EventKind,
    FinalResult, KeywordNotice, PartialResult, RecognitionEvent, RecognitionResult, ResultReason,
};
