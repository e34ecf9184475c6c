pub mod builtin;
pub mod dispatch;
pub mod intent;
pub mod kb;
pub mod registry;
pub mod skill;

pub use dispatch::Dispatcher;
pub use registry::SkillRegistry;
pub use skill::{NotificationSink, Skill, SkillContext, SkillError};
