use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::Type;
use crate::action::ActionContext;
use crate::args::Arg;
use crate::error::TreeError;
use crate::flow::FlowSteps;

/// Body of a synchronous action.
pub type ActionFn = Rc<dyn Fn(&ActionContext, &[Arg]) -> Result<Value, TreeError>>;

/// Produces the step sequence of one asynchronous action run.
pub type FlowFactory = Rc<dyn Fn(&[Arg]) -> Box<dyn FlowSteps>>;

#[derive(Clone)]
pub(crate) enum ActionDef {
    Sync(ActionFn),
    Flow(FlowFactory),
}

/// A named record type with typed properties and declared actions.
pub struct ModelType {
    name: String,
    properties: IndexMap<String, Type>,
    actions: IndexMap<String, ActionDef>,
}

impl ModelType {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            properties: IndexMap::new(),
            actions: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &IndexMap<String, Type> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Type> {
        self.properties.get(key)
    }

    /// Name of the property typed as `identifier`, if any.
    pub fn identifier_key(&self) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, ty)| matches!(ty, Type::Identifier))
            .map(|(key, _)| key.as_str())
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub(crate) fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Declares a model: properties first, then the actions that may mutate
/// them. Every action registered here is dispatched through the action
/// interceptor, which is what makes it recordable.
pub struct ModelBuilder {
    name: String,
    properties: IndexMap<String, Type>,
    actions: IndexMap<String, ActionDef>,
}

impl ModelBuilder {
    pub fn prop(mut self, key: impl Into<String>, ty: Type) -> Self {
        self.properties.insert(key.into(), ty);
        self
    }

    /// Registers a synchronous action.
    pub fn action<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&ActionContext, &[Arg]) -> Result<Value, TreeError> + 'static,
    {
        self.actions.insert(name.into(), ActionDef::Sync(Rc::new(body)));
        self
    }

    /// Registers an asynchronous action. `factory` is called once per run
    /// with the call arguments and returns the run's step sequence.
    pub fn flow<F, S>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[Arg]) -> S + 'static,
        S: FlowSteps + 'static,
    {
        let wrapped: FlowFactory =
            Rc::new(move |args: &[Arg]| -> Box<dyn FlowSteps> { Box::new(factory(args)) });
        self.actions.insert(name.into(), ActionDef::Flow(wrapped));
        self
    }

    pub fn build(self) -> Type {
        Type::Model(Rc::new(ModelType {
            name: self.name,
            properties: self.properties,
            actions: self.actions,
        }))
    }
}
