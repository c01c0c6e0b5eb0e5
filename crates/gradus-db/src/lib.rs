pub mod direction;
pub mod position;
pub mod registry;
pub mod runner;
pub mod source;
pub mod step;
pub mod validator;
pub mod window;

pub use direction::{Direction, Span};
pub use gradus_common::{ActionError, Defect, Error, Phase, Result};
pub use position::{PositionRecord, PositionStore};
pub use registry::Registry;
pub use runner::{Migrator, StepStatus};
pub use step::{ActionResult, SqlAction, Step, StepAction};
pub use validator::{PassCount, ValidationReport};
pub use window::select_window;
