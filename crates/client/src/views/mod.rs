mod frameworks;

pub use frameworks::{FrameworkRow, FrameworksView};
