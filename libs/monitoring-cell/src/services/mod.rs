pub mod alerts;
pub mod dispatcher;
pub mod evaluator;
pub mod event_bus;
pub mod ingest;
pub mod notify;

pub use alerts::{AlertLifecycleManager, EvaluationReport, RuleOutcome, RuleTransition};
pub use dispatcher::EvaluationDispatcher;
pub use evaluator::{evaluate, Verdict};
pub use event_bus::{EventBus, Subscription};
pub use ingest::IngestService;
pub use notify::{Notifier, NotifyError, SlackNotifier};
