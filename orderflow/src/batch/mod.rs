//! Batch windows.
//!
//! A business day is split into fixed, named windows ("1차", "2차", ..., "막차",
//! "추가"). Every wall-clock instant belongs to exactly one window; the
//! classifier maps instants to windows and checks operator-declared labels.

mod classifier;
mod clock;
mod table;

pub use classifier::{BatchClassifier, BatchSlot, BatchValidation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use table::{Batch, BatchTable};
