#![allow(dead_code)]

use std::future::Future;

use serde_json::{json, Value};
use statetree::flow::Yielded;
use statetree::types::{
    array, boolean, identifier, maybe, number, optional, reference, string, ModelType,
};
use statetree::{ActionContext, Arg, Node, Resume, Step, TreeError, Type};

pub fn task_type() -> Type {
    ModelType::builder("Task")
        .prop("title", optional(string(), json!("")))
        .prop("done", optional(boolean(), json!(false)))
        .action("toggle", |cx, _args| {
            let done = cx.node().get("done")?.as_bool().unwrap_or(false);
            cx.node().set("done", !done)?;
            Ok(Value::Null)
        })
        .action("rename", |cx, args| {
            let title = args
                .first()
                .and_then(Arg::as_str)
                .ok_or_else(|| TreeError::failed("rename needs a title"))?;
            cx.node().set("title", title)?;
            Ok(Value::Null)
        })
        .build()
}

pub fn task() -> Node {
    task_type().create(json!({})).unwrap()
}

/// Store with customers and orders; orders reference customers.
pub struct Shop {
    pub store: Type,
    pub order: Type,
}

pub fn shop() -> Shop {
    let customer = ModelType::builder("Customer")
        .prop("id", identifier())
        .prop("name", string())
        .build();
    let order = ModelType::builder("Order")
        .prop("id", identifier())
        .prop("customer", maybe(reference(&customer)))
        .prop("items", array(string()))
        .action("assign", |cx, args| {
            let customer = args.first().cloned().unwrap_or(Arg::Value(Value::Null));
            cx.node().set("customer", customer)?;
            Ok(Value::Null)
        })
        .action("addItem", |cx, args| {
            let item = args.first().cloned().unwrap_or(Arg::Value(Value::Null));
            cx.node().child("items")?.push(item)?;
            Ok(Value::Null)
        })
        .action("note", |cx, _args| {
            cx.node().child("items")?.push("noted")?;
            Ok(Value::Null)
        })
        .build();
    let store = ModelType::builder("Store")
        .prop("customers", array(customer))
        .prop("orders", array(order.clone()))
        .action("checkout", |cx, args| {
            let order = cx.node().resolve_path("/orders/0")?;
            for item in args {
                order.call("addItem", vec![item.clone()])?;
            }
            Ok(Value::Null)
        })
        .build();
    Shop { store, order }
}

pub fn shop_snapshot() -> Value {
    json!({
        "customers": [
            {"id": "c1", "name": "Ada"},
            {"id": "c2", "name": "Grace"}
        ],
        "orders": [
            {"id": "o1", "items": []},
            {"id": "o2", "items": []}
        ]
    })
}

pub fn store() -> Node {
    shop().store.create(shop_snapshot()).unwrap()
}

/// Completes on a later scheduler tick with `result`.
pub fn fetch(result: Result<Value, TreeError>) -> impl Future<Output = Result<Value, TreeError>> {
    async move {
        tokio::task::yield_now().await;
        result
    }
}

fn unexpected(input: Resume) -> TreeError {
    TreeError::failed(format!("unexpected resume: {input:?}"))
}

pub fn loader_type() -> Type {
    ModelType::builder("Loader")
        .prop("state", optional(string(), json!("idle")))
        .prop("value", maybe(number()))
        .action("reset", |cx, _args| {
            cx.node().set("state", "idle")?;
            Ok(Value::Null)
        })
        // Two awaited steps, then returns.
        .flow("load", |_args: &[Arg]| {
            let mut stage = 0;
            move |cx: &ActionContext, input: Resume| -> Result<Step, TreeError> {
                stage += 1;
                let node = cx.node();
                match (stage, input) {
                    (1, Resume::Start) => {
                        node.set("state", "pending")?;
                        Ok(Step::wait(fetch(Ok(json!(1)))))
                    }
                    (2, Resume::Value(v)) => {
                        node.set("value", v)?;
                        Ok(Step::wait(fetch(Ok(json!(2)))))
                    }
                    (3, Resume::Value(v)) => {
                        node.set("value", v)?;
                        node.set("state", "done")?;
                        Ok(Step::done("loaded"))
                    }
                    (_, other) => Err(unexpected(other)),
                }
            }
        })
        // The awaited operation fails and the sequence recovers.
        .flow("loadRecovering", |_args: &[Arg]| {
            let mut stage = 0;
            move |cx: &ActionContext, input: Resume| -> Result<Step, TreeError> {
                stage += 1;
                match (stage, input) {
                    (1, Resume::Start) => Ok(Step::wait(fetch(Err(TreeError::failed("offline"))))),
                    (2, Resume::Error(_)) => {
                        cx.node().set("state", "error")?;
                        Ok(Step::done("recovered"))
                    }
                    (_, other) => Err(unexpected(other)),
                }
            }
        })
        // The second awaited operation fails and the failure is not handled.
        .flow("loadFailing", |_args: &[Arg]| {
            let mut stage = 0;
            move |cx: &ActionContext, input: Resume| -> Result<Step, TreeError> {
                stage += 1;
                match (stage, input) {
                    (1, Resume::Start) => {
                        cx.node().set("state", "pending")?;
                        Ok(Step::wait(fetch(Ok(json!(1)))))
                    }
                    (2, Resume::Value(v)) => {
                        cx.node().set("value", v)?;
                        Ok(Step::wait(fetch(Err(TreeError::failed("network down")))))
                    }
                    (3, Resume::Error(err)) => Err(err),
                    (_, other) => Err(unexpected(other)),
                }
            }
        })
        .flow("badYield", |_args: &[Arg]| {
            |_cx: &ActionContext, _input: Resume| -> Result<Step, TreeError> {
                Ok(Step::Yield(Yielded::Value(json!(42))))
            }
        })
        // Stores its argument after one awaited step.
        .flow("store", |args: &[Arg]| {
            let value = args.first().and_then(Arg::as_value).cloned().unwrap_or(Value::Null);
            move |cx: &ActionContext, input: Resume| -> Result<Step, TreeError> {
                match input {
                    Resume::Start => Ok(Step::wait(fetch(Ok(value.clone())))),
                    Resume::Value(v) => {
                        cx.node().set("value", v.clone())?;
                        Ok(Step::Return(v))
                    }
                    Resume::Error(err) => Err(err),
                }
            }
        })
        .build()
}

pub fn loader() -> Node {
    loader_type().create(json!({})).unwrap()
}
