//! Saga definitions: an ordered, immutable list of steps per saga type.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Result, SagaError};
use crate::message::{CommandWithDestination, ReplyEnvelope, SagaCommand};

/// Data carried by a saga instance between steps.
pub trait SagaData: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SagaData for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

type CommandFn<D> = Arc<dyn Fn(&D) -> Result<CommandWithDestination> + Send + Sync>;
type ReplyFn<D> = Arc<dyn Fn(&mut D, &ReplyEnvelope) -> Result<()> + Send + Sync>;

/// One local transaction in a saga.
///
/// A step without an action is local: its forward work was done by the
/// caller before the saga started, so it counts as completed as soon as the
/// walk reaches it. Its compensation is still sent on unwind.
pub struct Step<D> {
    name: &'static str,
    action: Option<CommandFn<D>>,
    reply_handler: Option<ReplyFn<D>>,
    compensation: Option<CommandFn<D>>,
}

impl<D> Clone for Step<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            action: self.action.clone(),
            reply_handler: self.reply_handler.clone(),
            compensation: self.compensation.clone(),
        }
    }
}

impl<D: SagaData> Step<D> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            action: None,
            reply_handler: None,
            compensation: None,
        }
    }

    /// Sends the command built by `f` to `destination`.
    pub fn invoke<C, F>(mut self, destination: &'static str, f: F) -> Self
    where
        C: SagaCommand,
        F: Fn(&D) -> C + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(move |data: &D| -> Result<CommandWithDestination> {
            Ok(CommandWithDestination::new(destination, &f(data))?)
        }));
        self
    }

    /// Decodes a success reply as `R` and folds it into the saga data.
    pub fn on_reply<R, F>(mut self, f: F) -> Self
    where
        R: DeserializeOwned,
        F: Fn(&mut D, R) + Send + Sync + 'static,
    {
        let step = self.name;
        self.reply_handler = Some(Arc::new(move |data: &mut D, reply: &ReplyEnvelope| -> Result<()> {
            let decoded = reply.decode::<R>().map_err(|e| SagaError::ReplyDecode {
                step: step.to_string(),
                reason: e.to_string(),
            })?;
            f(data, decoded);
            Ok(())
        }));
        self
    }

    /// Sends the command built by `f` to `destination` to undo this step.
    pub fn with_compensation<C, F>(mut self, destination: &'static str, f: F) -> Self
    where
        C: SagaCommand,
        F: Fn(&D) -> C + Send + Sync + 'static,
    {
        self.compensation = Some(Arc::new(move |data: &D| -> Result<CommandWithDestination> {
            Ok(CommandWithDestination::new(destination, &f(data))?)
        }));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

/// An ordered list of steps, built once and shared by all instances.
pub struct SagaDefinition<D> {
    saga_type: &'static str,
    steps: Arc<[Step<D>]>,
}

impl<D> Clone for SagaDefinition<D> {
    fn clone(&self) -> Self {
        Self {
            saga_type: self.saga_type,
            steps: self.steps.clone(),
        }
    }
}

impl<D: SagaData> SagaDefinition<D> {
    /// Fails if there are no steps or a step has neither an action nor a
    /// compensation.
    pub fn new(saga_type: &'static str, steps: Vec<Step<D>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(SagaError::InvalidDefinition(format!(
                "{saga_type} has no steps"
            )));
        }
        if let Some(step) = steps
            .iter()
            .find(|s| s.action.is_none() && s.compensation.is_none())
        {
            return Err(SagaError::InvalidDefinition(format!(
                "{saga_type} step '{}' has neither an action nor a compensation",
                step.name
            )));
        }

        Ok(Self {
            saga_type,
            steps: steps.into(),
        })
    }

    pub fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    fn step(&self, index: usize) -> Result<&Step<D>> {
        self.steps.get(index).ok_or_else(|| {
            SagaError::InvalidDefinition(format!("{} has no step {index}", self.saga_type))
        })
    }

    fn decode(data: &serde_json::Value) -> Result<D> {
        Ok(serde_json::from_value(data.clone())?)
    }
}

/// A saga definition with its data type erased, so instances of any saga
/// type can be driven from their persisted JSON data.
pub trait SagaRunner: Send + Sync {
    fn saga_type(&self) -> &'static str;

    fn step_count(&self) -> usize;

    fn step_name(&self, index: usize) -> &'static str;

    fn has_action(&self, index: usize) -> bool;

    fn has_compensation(&self, index: usize) -> bool;

    fn forward_command(
        &self,
        index: usize,
        data: &serde_json::Value,
    ) -> Result<Option<CommandWithDestination>>;

    fn compensation_command(
        &self,
        index: usize,
        data: &serde_json::Value,
    ) -> Result<Option<CommandWithDestination>>;

    /// Runs the step's reply handler, if any, against the data.
    fn apply_reply(
        &self,
        index: usize,
        data: &mut serde_json::Value,
        reply: &ReplyEnvelope,
    ) -> Result<()>;
}

impl<D: SagaData> SagaRunner for SagaDefinition<D> {
    fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn step_name(&self, index: usize) -> &'static str {
        self.steps.get(index).map(|s| s.name).unwrap_or("<unknown>")
    }

    fn has_action(&self, index: usize) -> bool {
        self.steps.get(index).is_some_and(|s| s.has_action())
    }

    fn has_compensation(&self, index: usize) -> bool {
        self.steps.get(index).is_some_and(|s| s.has_compensation())
    }

    fn forward_command(
        &self,
        index: usize,
        data: &serde_json::Value,
    ) -> Result<Option<CommandWithDestination>> {
        match &self.step(index)?.action {
            Some(action) => action(&Self::decode(data)?).map(Some),
            None => Ok(None),
        }
    }

    fn compensation_command(
        &self,
        index: usize,
        data: &serde_json::Value,
    ) -> Result<Option<CommandWithDestination>> {
        match &self.step(index)?.compensation {
            Some(compensation) => compensation(&Self::decode(data)?).map(Some),
            None => Ok(None),
        }
    }

    fn apply_reply(
        &self,
        index: usize,
        data: &mut serde_json::Value,
        reply: &ReplyEnvelope,
    ) -> Result<()> {
        let Some(handler) = &self.step(index)?.reply_handler else {
            return Ok(());
        };
        let mut typed = Self::decode(data)?;
        handler(&mut typed, reply)?;
        *data = serde_json::to_value(&typed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CorrelationId;
    use crate::state::Direction;
    use serde::Deserialize;
    use store::AggregateId;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Data {
        order: u32,
        ticket: Option<u32>,
    }

    #[derive(Serialize)]
    struct MakeTicket {
        order: u32,
    }

    impl SagaCommand for MakeTicket {
        fn command_type(&self) -> &'static str {
            "MakeTicket"
        }
    }

    #[derive(Deserialize)]
    struct TicketMade {
        ticket: u32,
    }

    fn definition() -> SagaDefinition<Data> {
        SagaDefinition::new(
            "TicketSaga",
            vec![
                Step::new("local").with_compensation("orders", |d: &Data| MakeTicket { order: d.order }),
                Step::new("ticket")
                    .invoke("kitchen", |d: &Data| MakeTicket { order: d.order })
                    .on_reply(|d: &mut Data, r: TicketMade| d.ticket = Some(r.ticket)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_definition_is_invalid() {
        let result = SagaDefinition::<Data>::new("Empty", vec![]);
        assert!(matches!(result, Err(SagaError::InvalidDefinition(_))));
    }

    #[test]
    fn test_step_without_action_or_compensation_is_invalid() {
        let result = SagaDefinition::<Data>::new("Bad", vec![Step::new("nothing")]);
        assert!(matches!(result, Err(SagaError::InvalidDefinition(_))));
    }

    #[test]
    fn test_runner_builds_commands_from_json_data() {
        let def = definition();
        let data = serde_json::json!({ "order": 7, "ticket": null });

        assert!(def.forward_command(0, &data).unwrap().is_none());
        let cmd = def.forward_command(1, &data).unwrap().unwrap();
        assert_eq!(cmd.destination, "kitchen");
        assert_eq!(cmd.command_type, "MakeTicket");
        assert_eq!(cmd.payload["order"], 7);
        assert!(def.compensation_command(0, &data).unwrap().is_some());
        assert!(def.compensation_command(1, &data).unwrap().is_none());
    }

    #[test]
    fn test_reply_handler_updates_data() {
        let def = definition();
        let mut data = serde_json::json!({ "order": 7, "ticket": null });
        let id = CorrelationId::new(AggregateId::new(), 1, Direction::Forward);
        let reply = ReplyEnvelope::success(id, "TicketMade", &serde_json::json!({ "ticket": 99 }))
            .unwrap();

        def.apply_reply(1, &mut data, &reply).unwrap();

        assert_eq!(data["ticket"], 99);
    }

    #[test]
    fn test_undecodable_reply_is_an_error() {
        let def = definition();
        let mut data = serde_json::json!({ "order": 7, "ticket": null });
        let id = CorrelationId::new(AggregateId::new(), 1, Direction::Forward);
        let reply = ReplyEnvelope::success_empty(id);

        let result = def.apply_reply(1, &mut data, &reply);

        assert!(matches!(result, Err(SagaError::ReplyDecode { .. })));
        assert!(data["ticket"].is_null());
    }
}
