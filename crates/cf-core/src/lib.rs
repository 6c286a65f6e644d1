pub mod accessor;
pub mod error;
pub mod path;
pub mod session;
pub mod template;
pub mod types;
pub mod value;

pub use error::{FlowError, FlowResult};
pub use path::*;
pub use session::*;
pub use template::{has_template, render_template};
pub use types::*;
pub use value::*;
