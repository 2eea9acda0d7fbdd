pub mod dependency;
pub mod ecosystem;
pub mod project;
pub mod repository;
pub mod verdict;

pub use dependency::{Dependency, DependencyCategory};
pub use ecosystem::{Ecosystem, PackageManager, VersionScheme, DETECTION_ORDER};
pub use project::Project;
pub use repository::{Coverage, PartialReason, RefKind, RepoRef, RepositoryId, SourceHistory};
pub use verdict::{DriftCategory, DriftVerdict, LookupSource, LookupWarning};
