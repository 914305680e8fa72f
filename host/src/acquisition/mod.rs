//! reading acquisition: window bookkeeping, reading sources and the
//! controller that runs one window at a time.

mod controller;
mod source;
mod window;

pub use controller::{AcquisitionController, AcquisitionSettings, AcquisitionSnapshot};
pub use source::{PolledSource, SimulatedSource, SubscriptionSource};
pub use window::{AcquisitionWindow, Finalize, Offer, SourceKind, WindowPolicy, DISPLAY_BUFFER_LEN};
