//! UI event pipelines over simulated elements.
//!
//! A scripted "user" clicks a button and types into an input; several
//! consumer loops observe the same elements through different combinator
//! chains and log what they see.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tributary::{
    concat, format_log, from_iter, merge, on, zip, Driver, Emitter, LogSink, Sequence,
    SequenceExt,
};

use crate::config::DemoConfig;

/// A DOM-like event: what happened and on which element.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub kind: &'static str,
    pub target_type: &'static str,
    /// Button label or current input value
    pub text: String,
    pub key: Option<String>,
}

impl UiEvent {
    pub fn click(label: &str) -> Self {
        Self {
            kind: "click",
            target_type: "submit",
            text: label.to_string(),
            key: None,
        }
    }

    pub fn keyup(key: &str, value: &str) -> Self {
        Self {
            kind: "keyup",
            target_type: "text",
            text: value.to_string(),
            key: Some(key.to_string()),
        }
    }

    fn is_enter(&self) -> bool {
        self.key
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("enter"))
    }
}

/// Which element a merged event came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Tagged {
    Click(UiEvent),
    Enter(UiEvent),
}

pub type Element = Emitter<UiEvent>;

/// Keyups on `input` that are the Enter key.
pub fn on_enter(input: &Element) -> tributary::Result<impl Sequence<Item = UiEvent>> {
    Ok(on("keyup", input.clone())?.filter(UiEvent::is_enter))
}

/// Submitted input values, skipping a resubmission of the same value.
pub fn submitted_values(input: &Element) -> tributary::Result<impl Sequence<Item = UiEvent>> {
    Ok(on_enter(input)?.distinct_by(|event| event.text.clone()))
}

/// Target types of each click paired with the matching Enter press.
pub fn event_targets(
    button: &Element,
    input: &Element,
) -> tributary::Result<impl Sequence<Item = Vec<&'static str>>> {
    Ok(zip(on("click", button.clone())?, on_enter(input)?)
        .map(|(click, enter)| vec![click.target_type, enter.target_type]))
}

/// Delayed clicks and Enter presses, in arrival order.
pub fn clicks_or_enters(
    button: &Element,
    input: &Element,
    click_delay: Duration,
) -> tributary::Result<impl Sequence<Item = Tagged>> {
    Ok(merge(vec![
        on("click", button.clone())?
            .delay(click_delay)
            .map(Tagged::Click)
            .boxed(),
        on_enter(input)?.map(Tagged::Enter).boxed(),
    ]))
}

/// A banner line followed by every click label.
pub fn banner_then_clicks(button: &Element) -> tributary::Result<impl Sequence<Item = String>> {
    Ok(concat(vec![
        from_iter(vec!["listening for clicks".to_string()]).boxed(),
        on("click", button.clone())?.map(|e| e.text).boxed(),
    ]))
}

async fn simulate_user(button: Element, input: Element) -> Result<()> {
    let step = Duration::from_millis(50);

    button.emit("click", UiEvent::click("Send"));
    tokio::time::sleep(step).await;

    for key in ["h", "i"] {
        input.emit("keyup", UiEvent::keyup(key, "hi"));
    }
    input.emit("keyup", UiEvent::keyup("Enter", "hi"));
    tokio::time::sleep(step).await;

    // Same value again: the distinct pipeline stays quiet.
    input.emit("keyup", UiEvent::keyup("Enter", "hi"));
    tokio::time::sleep(step).await;

    button.emit("click", UiEvent::click("Send"));
    input.emit("keyup", UiEvent::keyup("Enter", "there"));
    tokio::time::sleep(step).await;

    info!("User done; detaching elements");
    button.close();
    input.close();
    Ok(())
}

/// Run every pipeline against a scripted session and wait for all of them.
pub async fn run(config: &DemoConfig, sink: Arc<dyn LogSink>) -> Result<()> {
    let button = Element::new();
    let input = Element::new();

    // Subscribe everything up front so no scripted event is missed.
    let mut delayed_clicks = on("click", button.clone())?.delay(config.click_delay);
    let mut raw_clicks = on("click", button.clone())?;
    let mut values = submitted_values(&input)?;
    let mut targets = event_targets(&button, &input)?;
    let mut merged = clicks_or_enters(&button, &input, config.click_delay)?;
    let mut banner = banner_then_clicks(&button)?;

    let (s1, s2, s3, s4, s5) = (
        sink.clone(),
        sink.clone(),
        sink.clone(),
        sink.clone(),
        sink.clone(),
    );

    Driver::new()
        .with_policy(config.failure_policy)
        .task("on-click-button", async move {
            while let Some(event) = delayed_clicks.pull_next().await? {
                s1.append(format_log("onClickButton", &event.text));
            }
            Ok(())
        })
        .task("on-enter-input", async move {
            while let Some(event) = values.pull_next().await? {
                s2.append(format_log("onEnterInput", &event.text));
            }
            Ok(())
        })
        .task("console", async move {
            while let Some(event) = raw_clicks.pull_next().await? {
                info!(kind = event.kind, target_type = event.target_type, "button clicked!!!");
            }
            Ok(())
        })
        .task("zip-targets", async move {
            while let Some(types) = targets.pull_next().await? {
                s3.append(format_log(
                    "zip(onClick + onEnter) |> map |> get(:type)",
                    &types.join(","),
                ));
            }
            Ok(())
        })
        .task("merge", async move {
            while let Some(tagged) = merged.pull_next().await? {
                let line = match tagged {
                    Tagged::Click(e) => format_log("merge(onClick + onEnter) |> :click", &e.text),
                    Tagged::Enter(e) => format_log("merge(onClick + onEnter) |> :enter", &e.text),
                };
                s4.append(line);
            }
            Ok(())
        })
        .task("concat", async move {
            while let Some(text) = banner.pull_next().await? {
                s5.append(format_log("concat(banner, onClick)", &text));
            }
            Ok(())
        })
        .task("user", simulate_user(button, input))
        .run()
        .await?;

    Ok(())
}
