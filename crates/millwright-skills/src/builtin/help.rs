use async_trait::async_trait;

use millwright_core::types::{InboundMessage, Intent, OutboundMessage};

use crate::skill::{Skill, SkillContext, SkillError};

const HELP_TEXT: &str = "\
**Millwright** - AI assistant for industrial maintenance.

Ask in plain language, or use a command:
- `/diagnose` - why is the equipment stopped?
- `/status` - current PLC tag values
- `/photo` - send an equipment photo for analysis
- `/wo` or `/workorder` - create a work order
- `/diagram` or `/wiring` - generate a wiring diagram
- `/search` - web search with cited sources
- `/gist` - generate and publish a document
- `/project` - scaffold a multi-file project
- `/run` or `$ <cmd>` - run a command on a maintenance host
- `/health` - system health and budget

Send a photo of a component nameplate and the knowledge base learns it \
automatically.";

pub struct HelpSkill;

#[async_trait]
impl Skill for HelpSkill {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "Command overview"
    }

    fn intents(&self) -> &'static [Intent] {
        &[Intent::Help]
    }

    async fn handle(
        &self,
        message: &InboundMessage,
        _ctx: &SkillContext,
    ) -> Result<OutboundMessage, SkillError> {
        Ok(OutboundMessage::reply_to(message, HELP_TEXT))
    }
}
