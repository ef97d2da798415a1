//! Counter + todo list backed by a JSON store.
//!
//! A scripted session dispatches actions while a render loop consumes
//! `listen_state` and redraws the state panel after every change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use tributary::{format_log, ActionTable, Driver, LogSink, Outcome, Sequence, Store};

use crate::config::DemoConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

/// Where `fetch_todos` gets its list from.
#[async_trait]
pub trait TodoLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Todo>>;
}

/// Returns a fixed list after a simulated network delay.
pub struct FakeLoader {
    latency: Duration,
}

impl FakeLoader {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl TodoLoader for FakeLoader {
    async fn load(&self) -> Result<Vec<Todo>> {
        tokio::time::sleep(self.latency).await;
        Ok(vec![
            Todo {
                id: 1,
                title: "delectus aut autem".into(),
                completed: false,
            },
            Todo {
                id: 2,
                title: "quis ut nam facilis et officia qui".into(),
                completed: false,
            },
            Todo {
                id: 3,
                title: "fugiat veniam minus".into(),
                completed: true,
            },
        ])
    }
}

pub fn initial_state() -> Value {
    json!({
        "username": "@darmau5",
        "count": 0,
        "fetchingTodos": false,
        "todos": [],
    })
}

fn count_of(state: &Value) -> i64 {
    state["count"].as_i64().unwrap_or(0)
}

fn todos_of(state: &Value) -> Vec<Todo> {
    serde_json::from_value(state["todos"].clone()).unwrap_or_default()
}

/// The demo's action table.
///
/// - `increment` / `decrement`: adjust `count`, never below zero
/// - `change_name`: set `username` from a string argument
/// - `toggle_todo`: flip `completed` on the todo whose id is the argument
/// - `fetch_todos`: deferred; raises `fetchingTodos` while the loader runs
pub fn actions(loader: Arc<dyn TodoLoader>) -> ActionTable<Value> {
    ActionTable::<Value>::new()
        .action("increment", |_, state, _| {
            Outcome::Partial(json!({ "count": count_of(&state) + 1 }))
        })
        .action("decrement", |_, state, _| {
            Outcome::Partial(json!({ "count": (count_of(&state) - 1).max(0) }))
        })
        .action("change_name", |args, _, _| match args.as_str() {
            Some(name) => Outcome::Partial(json!({ "username": name })),
            None => {
                warn!(%args, "change_name expects a string");
                Outcome::Nothing
            }
        })
        .action("toggle_todo", |args, state, _| {
            let Some(id) = args.as_u64() else {
                warn!(%args, "toggle_todo expects a todo id");
                return Outcome::Nothing;
            };
            let mut todos = todos_of(&state);
            let Some(todo) = todos.iter_mut().find(|t| t.id == id) else {
                return Outcome::Nothing;
            };
            todo.completed = !todo.completed;
            Outcome::Partial(json!({ "todos": todos }))
        })
        .action("fetch_todos", move |_, _, dispatch| {
            let loader = loader.clone();
            Outcome::deferred(async move {
                dispatch.update_state(json!({ "fetchingTodos": true }));
                let todos = loader.load().await.context("Failed to load todos")?;
                Ok(Some(json!({ "todos": todos, "fetchingTodos": false })))
            })
        })
}

pub fn title(state: &Value) -> String {
    format!("Halo liebe {}!!!", state["username"].as_str().unwrap_or_default())
}

/// Human-readable state panel: a summary line, the todo list, then the
/// raw state.
pub fn render(state: &Value) -> Result<String> {
    let mut panel = format!("The count is currently at {}", count_of(state));
    if state["fetchingTodos"].as_bool().unwrap_or(false) {
        panel.push_str("\nFetching todos...");
    }
    for todo in todos_of(state) {
        let mark = if todo.completed { "x" } else { " " };
        panel.push_str(&format!("\n[{mark}] {} {}", todo.id, todo.title));
    }
    panel.push('\n');
    panel.push_str(&serde_json::to_string_pretty(state)?);
    Ok(panel)
}

async fn simulate_user(store: Store<Value>) -> Result<()> {
    store.dispatch("fetch_todos", Value::Null)?.settled().await?;

    store.dispatch("increment", Value::Null)?;
    store.dispatch("increment", Value::Null)?;
    store.dispatch("decrement", Value::Null)?;
    store.dispatch("change_name", json!("@tributary"))?;
    store.dispatch("toggle_todo", json!(2))?;

    info!(actions = ?store.action_names(), "User done");
    Ok(())
}

/// Run the scripted session against a fresh store and render every change.
pub async fn run(config: &DemoConfig, sink: Arc<dyn LogSink>) -> Result<()> {
    let loader: Arc<dyn TodoLoader> = Arc::new(FakeLoader::new(config.fetch_latency));
    let store = Store::with_actions(initial_state(), actions(loader));

    sink.append(format_log("title", &title(&store.get_state())));
    sink.append(format_log("state", &render(&store.get_state())?));

    // Ends once the last store handle (held by the user task) is gone.
    let mut changes = store.listen_state();

    Driver::new()
        .with_policy(config.failure_policy)
        .task("render", async move {
            while let Some((state, previous)) = changes.pull_next().await? {
                if state["username"] != previous["username"] {
                    sink.append(format_log("title", &title(&state)));
                }
                sink.append(format_log("state", &render(&state)?));
            }
            Ok(())
        })
        .task("user", simulate_user(store))
        .run()
        .await?;

    Ok(())
}
