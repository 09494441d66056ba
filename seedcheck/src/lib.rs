// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod logic;
pub mod placement;
pub mod reach;
pub mod resolver;
pub mod settings;
pub mod trace;

pub use logic::{Logic, ResolverLimits, SearchAbort};
pub use placement::{GeneratorReach, UncollectedState};
pub use reach::ResolverReach;
pub use resolver::{resolve, validate_layout, ResolveOptions, ResolveReport, Verdict};
pub use settings::ResolverSettings;
