//! Named demonstration flows and console output.

use crate::error::Result;
use crate::repl::interruptible;
use futures::StreamExt;
use runtime::interpret::split_reasoning;
use runtime::model::{StreamAccumulator, StreamChunk};
use runtime::{Backend, ChatOutcome, Dispatcher, Message, TurnReport, interpret};
use std::io::Write;
use tokio_util::sync::CancellationToken;

pub const SMS_PROMPT: &str = "I'd like to order 10 'Clean Code' books to 666-111-222";
pub const WEATHER_PROMPT: &str = "What's the weather like today?";

/// Single-turn dispatch with the SMS tool, printing every stage.
pub async fn sms<B: Backend>(dispatcher: &Dispatcher<B>, system: &str, prompt: &str) -> Result<()> {
    println!("User: {prompt}\n");
    let cancel = CancellationToken::new();
    let report = interruptible(&cancel, dispatcher.run_turn(&[], system, prompt, &cancel)).await?;
    print_outcome(&report.outcome);
    println!("Protocol: {}", report.protocol);
    println!("Final: {}", report.text);
    Ok(())
}

/// Multi-round dispatch with the location and weather tools.
pub async fn weather<B: Backend>(
    dispatcher: &Dispatcher<B>,
    system: &str,
    prompt: &str,
) -> Result<()> {
    let messages = conversation(system, prompt);
    let cancel = CancellationToken::new();
    let conversation = interruptible(&cancel, dispatcher.run_until_done(messages, &cancel)).await?;
    for message in &conversation {
        print_message(message);
    }
    Ok(())
}

/// Stream one completion with the SMS tool offered.
pub async fn stream<B: Backend>(
    dispatcher: &Dispatcher<B>,
    system: &str,
    prompt: &str,
) -> Result<()> {
    let messages = conversation(system, prompt);
    let cancel = CancellationToken::new();

    let consumed = interruptible(&cancel, async {
        let mut stream = dispatcher.stream(&messages, &cancel).await?;
        let mut acc = StreamAccumulator::new();
        let mut stdout = std::io::stdout();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(runtime::Error::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            if let StreamChunk::Text(text) = &chunk {
                print!("{text}");
                let _ = stdout.flush();
            }
            acc.push(chunk);
        }
        Ok(acc.finish())
    })
    .await?;
    println!();

    for call in &consumed.tool_calls {
        println!("Tool call: {}({})", call.name, call.arguments);
    }
    if consumed.tool_calls.is_empty() {
        if let Some(call) = interpret(&consumed).tool_call() {
            println!(
                "Tool call: {}({}) ({})",
                call.function_name, call.raw_arguments, call.source
            );
        }
    }
    println!("Finish reason: {}", consumed.finish_reason);
    Ok(())
}

/// Opening messages of a scenario; an empty system prompt is left out.
fn conversation(system: &str, prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

/// Print the answer of an interactive or one-shot turn.
pub fn print_report(report: &TurnReport, verbose: bool) {
    if verbose {
        print_outcome(&report.outcome);
    } else if let Some(call) = report.outcome.tool_call() {
        println!("[tool] {} ({})", call.function_name, call.source);
    }
    println!("\n{}\n", report.text);
}

fn print_outcome(outcome: &ChatOutcome) {
    if let Some(thoughts) = &outcome.thoughts {
        println!("Thinking: {thoughts}");
    }
    if let Some(content) = &outcome.content {
        println!("Content: {content}");
    }
    if let Some(call) = outcome.tool_call() {
        println!("Tool call: {} ({})", call.function_name, call.source);
        println!("Arguments: {}", call.raw_arguments);
    }
    if let Some(result) = outcome.tool_result() {
        let status = if result.succeeded { "ok" } else { "failed" };
        println!("Result ({status}): {}", result.output);
    }
}

fn print_message(message: &Message) {
    match message {
        Message::System { .. } => {}
        Message::User { text } => println!("User: {text}"),
        Message::Assistant { text, tool_calls } => {
            let (_, visible) = split_reasoning(text);
            if !visible.is_empty() {
                println!("Assistant: {visible}");
            }
            for call in tool_calls {
                println!("Assistant -> {}({})", call.name, call.arguments);
            }
        }
        Message::ToolResult { call_id, text } => println!("Tool [{call_id}]: {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system_prompt_is_omitted() {
        assert_eq!(conversation("", "hi"), [Message::user("hi")]);
        assert_eq!(
            conversation("Be brief.", "hi"),
            [Message::system("Be brief."), Message::user("hi")]
        );
    }
}
