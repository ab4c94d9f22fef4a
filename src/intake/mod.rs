//! The intake dialogue: a fixed sequence of questions that ends in a
//! submission to the operator.

pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod machine;
pub mod router;
pub mod screens;
pub mod state;
pub mod surface;

pub use dispatcher::SubmissionDispatcher;
pub use engine::{Handled, IntakeEngine};
pub use event::{Choice, Event};
pub use machine::{Ignored, Outcome, transition};
pub use router::ConversationRouter;
pub use screens::{FORMATS, SERVICES, Screen};
pub use state::{CompletedSubmission, ConversationState, Step, Submission};
pub use surface::ChatSurface;
