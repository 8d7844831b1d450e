pub mod executor;
pub mod notifier;
pub mod template;

pub use executor::{apply, plan_actions, ActionEffect, ActionExecutor, ActionPlan, PendingNotification};
pub use notifier::{LoggingNotifier, Notifier};
pub use template::TemplateContext;
