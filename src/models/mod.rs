//! Domain models shared by the supervisor, the feedback store, and the HTTP layer.

pub mod feedback;
pub mod input;
pub mod session;

pub use feedback::{ClientOrigin, CompletionSubmission, FeedbackRecord, FeedbackSubmission};
pub use input::InputToken;
pub use session::{RunnerState, RunnerStatus, SessionKey};
