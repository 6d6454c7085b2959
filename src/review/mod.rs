// Review pipeline
//
// The decision core: triage, evidence gathering, verification, and the
// orchestrated run over one changeset.

pub mod context;
pub mod events;
pub mod exclusions;
pub mod language;
pub mod orchestrator;
pub mod types;
pub mod verifier;

pub use events::{ReviewEvent, ReviewObserver, TracingObserver};
pub use orchestrator::ReviewOrchestrator;
pub use types::{
    LinterEvidence, LinterFinding, LinterSeverity, ReviewComment, ReviewStats, Severity,
    VerificationVerdict,
};
pub use verifier::{DoubleCheckVerifier, Evidence, FileReferenceExtractor, PathTokenExtractor};
