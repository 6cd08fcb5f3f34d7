//! End-to-end tests for the tool-calling loop with a scripted model and an
//! in-process tool server.
//!
//! Run with: `cargo test -p bridge-core --test loop_integration`

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_core::{
    Agent, AgentEvent, ChatSession, ConversationTurn, EMPTY_REPLY_NOTICE, SessionState,
    SessionStep, ToolCatalog,
};
use bridge_types::{
    ApiError, BridgeError, ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason,
    FunctionCall, PromptMessage, Role, ToolCall, ToolDescriptor, ToolError,
    ToolInvocationRequest, ToolInvocationResult, TransportError, Usage,
    provider::Provider,
    server::{ServerFuture, ToolServer},
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A provider that replays scripted replies and records every request.
struct MockProvider {
    replies: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// Set by the mock server while a tool call is running.
    tool_in_flight: Arc<AtomicBool>,
    queried_during_tool: AtomicBool,
}

impl MockProvider {
    fn new(replies: Vec<ChatResponse>, tool_in_flight: Arc<AtomicBool>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            tool_in_flight,
            queried_during_tool: AtomicBool::new(false),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Provider for MockProvider {
    fn chat_completion<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ChatResponse, ApiError>> + Send + 'a>,
    > {
        Box::pin(async move {
            if self.tool_in_flight.load(Ordering::SeqCst) {
                self.queried_during_tool.store(true, Ordering::SeqCst);
            }
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::InvalidResponse("script exhausted".into()))
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// MockServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Behavior {
    Reply(String),
    Fail(String),
    Timeout,
    Hang,
    Crash,
}

/// An in-process tool server with per-tool canned behavior.
struct MockServer {
    behaviors: HashMap<String, Behavior>,
    prompts: HashMap<String, Vec<PromptMessage>>,
    invoked: Mutex<Vec<ToolInvocationRequest>>,
    prompt_requests: Mutex<Vec<(String, HashMap<String, String>)>>,
    in_flight: Arc<AtomicBool>,
}

impl MockServer {
    fn new(behaviors: &[(&str, Behavior)], in_flight: Arc<AtomicBool>) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(n, b)| (n.to_string(), b.clone()))
                .collect(),
            prompts: HashMap::new(),
            invoked: Mutex::new(Vec::new()),
            prompt_requests: Mutex::new(Vec::new()),
            in_flight,
        }
    }

    fn with_prompt(mut self, name: &str, messages: Vec<PromptMessage>) -> Self {
        self.prompts.insert(name.to_string(), messages);
        self
    }

    fn invoked_names(&self) -> Vec<String> {
        self.invoked
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }
}

impl ToolServer for MockServer {
    fn invoke<'a>(
        &'a self,
        request: &'a ToolInvocationRequest,
    ) -> ServerFuture<'a, ToolInvocationResult> {
        Box::pin(async move {
            self.in_flight.store(true, Ordering::SeqCst);
            self.invoked.lock().unwrap().push(request.clone());
            let behavior = self
                .behaviors
                .get(&request.name)
                .cloned()
                .unwrap_or(Behavior::Fail("not scripted".into()));

            let outcome = match behavior {
                Behavior::Reply(payload) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(ToolInvocationResult::success(&request.call_id, payload))
                }
                Behavior::Fail(message) => Err(ToolError::ExecutionFailed {
                    tool: request.name.clone(),
                    message,
                }),
                Behavior::Timeout => Err(ToolError::Timeout {
                    tool: request.name.clone(),
                    timeout_ms: 5000,
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ToolInvocationResult::success(&request.call_id, "late"))
                }
                Behavior::Crash => Err(ToolError::TransportBroken(
                    "tool server exited (exit status: 1)".into(),
                )),
            };
            self.in_flight.store(false, Ordering::SeqCst);
            outcome
        })
    }

    fn get_prompt<'a>(
        &'a self,
        name: &'a str,
        arguments: HashMap<String, String>,
    ) -> ServerFuture<'a, Vec<PromptMessage>> {
        Box::pin(async move {
            self.prompt_requests
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            self.prompts
                .get(name)
                .cloned()
                .ok_or_else(|| ToolError::ExecutionFailed {
                    tool: name.to_string(),
                    message: "unknown prompt".into(),
                })
        })
    }
}

// ---------------------------------------------------------------------------
// EventCapture
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct EventCapture {
    saw_cancelled: bool,
    saw_done: bool,
    tool_starts: Vec<String>,
    tool_errors: Vec<String>,
    notices: Vec<String>,
    errors: Vec<String>,
}

impl EventCapture {
    fn callback(capture: Arc<Mutex<Self>>) -> impl FnMut(AgentEvent) {
        move |event| {
            let mut c = capture.lock().unwrap();
            match event {
                AgentEvent::Cancelled => c.saw_cancelled = true,
                AgentEvent::Done => c.saw_done = true,
                AgentEvent::ToolStart { name, .. } => c.tool_starts.push(name),
                AgentEvent::ToolEnd {
                    name,
                    is_error: true,
                    ..
                } => c.tool_errors.push(name),
                AgentEvent::Notice(n) => c.notices.push(n),
                AgentEvent::Error(e) => c.errors.push(e),
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reply builders
// ---------------------------------------------------------------------------

fn reply(message: ChatMessage, finish: FinishReason) -> ChatResponse {
    ChatResponse {
        id: "chatcmpl-test".to_string(),
        model: "test-model".to_string(),
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: Some(finish),
        }],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

fn text_reply(text: &str) -> ChatResponse {
    reply(ChatMessage::text(Role::Assistant, text), FinishReason::Stop)
}

fn tool_reply(calls: &[(&str, &str, &str)]) -> ChatResponse {
    reply(
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: args.to_string(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        FinishReason::ToolCalls,
    )
}

fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "city": { "type": "string" } }
        }),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    provider: Arc<MockProvider>,
    server: Arc<MockServer>,
    session: ChatSession,
}

fn harness(
    replies: Vec<ChatResponse>,
    tools: &[&str],
    behaviors: &[(&str, Behavior)],
    prompts: &[(&str, Vec<PromptMessage>)],
) -> Harness {
    let in_flight = Arc::new(AtomicBool::new(false));
    let provider = Arc::new(MockProvider::new(replies, Arc::clone(&in_flight)));
    let mut server = MockServer::new(behaviors, in_flight);
    for (name, messages) in prompts {
        server = server.with_prompt(name, messages.clone());
    }
    let server = Arc::new(server);

    let catalog = ToolCatalog::build(tools.iter().map(|t| descriptor(t)).collect()).unwrap();
    let mut agent = Agent::new(
        provider.clone() as Arc<dyn Provider>,
        server.clone() as Arc<dyn ToolServer>,
        catalog,
        "test-model".to_string(),
        4096,
    );
    agent.set_system_prompt("You are a test assistant.".to_string());
    agent.set_temperature(0.5);
    agent.set_max_tool_rounds(3);

    Harness {
        provider,
        server,
        session: ChatSession::new(agent, "quit"),
    }
}

async fn send(h: &mut Harness, line: &str) -> (Result<SessionStep, BridgeError>, EventCapture) {
    let capture = Arc::new(Mutex::new(EventCapture::default()));
    let result = h
        .session
        .handle_input(line, CancellationToken::new(), EventCapture::callback(capture.clone()))
        .await;
    let capture = std::mem::take(&mut *capture.lock().unwrap());
    (result, capture)
}

fn count_tool_results(h: &Harness) -> usize {
    h.session
        .conversation()
        .snapshot()
        .iter()
        .filter(|t| matches!(t, ConversationTurn::ToolResult { .. }))
        .count()
}

fn tool_result_payload(h: &Harness, call_id: &str) -> ToolInvocationResult {
    h.session
        .conversation()
        .snapshot()
        .iter()
        .find_map(|t| match t {
            ConversationTurn::ToolResult { result } if result.call_id == call_id => {
                Some(result.clone())
            }
            _ => None,
        })
        .unwrap()
}

/// Every tool call in a request's transcript is answered before the next
/// non-tool message.
fn assert_transcript_balanced(request: &ChatRequest) {
    let mut expected: Vec<String> = Vec::new();
    for message in &request.messages {
        match message.role {
            Role::Tool => {
                let id = message.tool_call_id.clone().unwrap();
                let pos = expected.iter().position(|e| *e == id);
                assert!(pos.is_some(), "tool result {id} has no matching call");
                expected.remove(pos.unwrap());
            }
            _ => {
                assert!(
                    expected.is_empty(),
                    "unanswered calls {expected:?} before a {:?} message",
                    message.role
                );
                expected = message.tool_calls.iter().map(|c| c.id.clone()).collect();
            }
        }
    }
    assert!(expected.is_empty(), "request ends with unanswered calls");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A weather question is answered through one tool call.
#[tokio::test]
async fn weather_question_is_answered_through_tool() {
    let mut h = harness(
        vec![
            tool_reply(&[("call_1", "get_weather", r#"{"city":"Paris"}"#)]),
            text_reply("It's 18°C and cloudy in Paris."),
        ],
        &["get_weather"],
        &[(
            "get_weather",
            Behavior::Reply(r#"{"temperature":18,"condition":"cloudy"}"#.into()),
        )],
        &[],
    );

    let (result, events) = send(&mut h, "what is the weather in Paris").await;
    assert_eq!(
        result.unwrap(),
        SessionStep::Answer("It's 18°C and cloudy in Paris.".into())
    );
    assert_eq!(events.tool_starts, vec!["get_weather"]);
    assert!(events.saw_done);
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);

    // The tool saw the decoded arguments
    let invoked = h.server.invoked.lock().unwrap().clone();
    assert_eq!(invoked.len(), 1);
    assert_eq!(invoked[0].call_id, "call_1");
    assert_eq!(invoked[0].arguments["city"], "Paris");

    // Second request carries the tool result, system prompt and catalog
    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.messages[0].role, Role::System);
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[3].role, Role::Tool);
    assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(
        second.messages[3].content.as_deref(),
        Some(r#"{"temperature":18,"condition":"cloudy"}"#)
    );
    assert_eq!(second.temperature, Some(0.5));
    assert_eq!(second.max_tokens, Some(4096));
    assert_eq!(second.tools.as_ref().unwrap()[0].function.name, "get_weather");
    for request in &requests {
        assert_transcript_balanced(request);
    }

    assert_eq!(h.session.usage().total_tokens, 30);
    assert_eq!(h.session.tool_calls(), 1);
}

/// A timed-out tool becomes an error result and the session
/// keeps going.
#[tokio::test]
async fn tool_timeout_becomes_error_result() {
    let mut h = harness(
        vec![
            tool_reply(&[("call_1", "slow_tool", "{}")]),
            text_reply("The tool timed out, sorry."),
            text_reply("Hello again."),
        ],
        &["slow_tool"],
        &[("slow_tool", Behavior::Timeout)],
        &[],
    );

    let (result, events) = send(&mut h, "run the slow tool").await;
    assert_eq!(
        result.unwrap(),
        SessionStep::Answer("The tool timed out, sorry.".into())
    );
    assert_eq!(events.tool_errors, vec!["slow_tool"]);

    let result = tool_result_payload(&h, "call_1");
    assert!(!result.success);
    assert!(result.payload.starts_with("Error: "));
    assert!(result.payload.contains("timed out"));

    // Session still accepts input
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);
    let (result, _) = send(&mut h, "hello").await;
    assert_eq!(result.unwrap(), SessionStep::Answer("Hello again.".into()));
}

/// `quit` closes the session without contacting the model.
#[tokio::test]
async fn quit_closes_session() {
    let mut h = harness(vec![], &[], &[], &[]);

    let (result, _) = send(&mut h, "  QUIT ").await;
    assert_eq!(result.unwrap(), SessionStep::Closed);
    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(h.provider.requests().is_empty());
    assert!(h.session.conversation().is_empty());

    // Further input is refused
    let (result, _) = send(&mut h, "hello?").await;
    assert_eq!(result.unwrap(), SessionStep::Closed);
}

/// The tool server dies mid-call; the session reports a broken
/// transport and closes.
#[tokio::test]
async fn broken_transport_closes_session() {
    let mut h = harness(
        vec![tool_reply(&[("call_1", "get_weather", r#"{"city":"Oslo"}"#)])],
        &["get_weather"],
        &[("get_weather", Behavior::Crash)],
        &[],
    );

    let (result, events) = send(&mut h, "weather in Oslo").await;
    match result {
        Err(BridgeError::Transport(TransportError::Broken(reason))) => {
            assert!(reason.contains("exit status"));
        }
        other => panic!("expected broken transport, got {other:?}"),
    }
    assert_eq!(events.errors.len(), 1);
    assert_eq!(h.session.state(), SessionState::Closed);

    // The call still has exactly one result
    assert_eq!(count_tool_results(&h), 1);
    assert_eq!(h.provider.requests().len(), 1);
}

/// Multiple calls in one reply run in order, one result each, and the model
/// is never queried while a call is outstanding.
#[tokio::test]
async fn multiple_calls_run_sequentially() {
    let mut h = harness(
        vec![
            tool_reply(&[
                ("a", "get_weather", r#"{"city":"Paris"}"#),
                ("b", "get_forecast", r#"{"city":"Paris"}"#),
                ("c", "get_weather", r#"{"city":"Rome"}"#),
            ]),
            text_reply("Paris is cloudy, Rome is sunny."),
        ],
        &["get_weather", "get_forecast"],
        &[
            ("get_weather", Behavior::Reply("cloudy".into())),
            ("get_forecast", Behavior::Fail("upstream unavailable".into())),
        ],
        &[],
    );

    let (result, events) = send(&mut h, "compare Paris and Rome").await;
    assert!(matches!(result.unwrap(), SessionStep::Answer(_)));
    assert_eq!(
        h.server.invoked_names(),
        vec!["get_weather", "get_forecast", "get_weather"]
    );
    assert_eq!(events.tool_starts.len(), 3);
    assert_eq!(events.tool_errors, vec!["get_forecast"]);

    assert_eq!(count_tool_results(&h), 3);
    let ids: Vec<String> = h
        .session
        .conversation()
        .snapshot()
        .iter()
        .filter_map(|t| match t {
            ConversationTurn::ToolResult { result } => Some(result.call_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(!tool_result_payload(&h, "b").success);

    assert!(!h.provider.queried_during_tool.load(Ordering::SeqCst));
    for request in &h.provider.requests() {
        assert_transcript_balanced(request);
    }
}

/// A tool missing from the catalog is answered with an error result instead
/// of reaching the server.
#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let mut h = harness(
        vec![
            tool_reply(&[("call_1", "launch_rockets", "{}")]),
            text_reply("I can't do that."),
        ],
        &["get_weather"],
        &[],
        &[],
    );

    let (result, _) = send(&mut h, "launch").await;
    assert_eq!(result.unwrap(), SessionStep::Answer("I can't do that.".into()));
    assert!(h.server.invoked_names().is_empty());

    let result = tool_result_payload(&h, "call_1");
    assert!(!result.success);
    assert!(result.payload.contains("Unknown tool: launch_rockets"));
}

/// Malformed argument strings are dispatched as an empty object.
#[tokio::test]
async fn malformed_arguments_dispatch_empty_object() {
    let mut h = harness(
        vec![
            tool_reply(&[("call_1", "get_weather", "{city: Paris")]),
            text_reply("Which city?"),
        ],
        &["get_weather"],
        &[("get_weather", Behavior::Reply("need a city".into()))],
        &[],
    );

    let (result, _) = send(&mut h, "weather").await;
    assert!(result.is_ok());
    let invoked = h.server.invoked.lock().unwrap().clone();
    assert!(invoked[0].arguments.is_empty());
}

/// Tool calls without ids get generated ones that tie call and result.
#[tokio::test]
async fn missing_call_ids_are_generated() {
    let mut h = harness(
        vec![
            tool_reply(&[("", "get_weather", r#"{"city":"Paris"}"#)]),
            text_reply("Cloudy."),
        ],
        &["get_weather"],
        &[("get_weather", Behavior::Reply("cloudy".into()))],
        &[],
    );

    let (result, _) = send(&mut h, "weather").await;
    assert!(result.is_ok());

    let requests = h.provider.requests();
    let second = &requests[1];
    let call_id = second.messages[2].tool_calls[0].id.clone();
    assert!(!call_id.is_empty());
    assert_eq!(second.messages[3].tool_call_id.as_deref(), Some(call_id.as_str()));
}

/// The loop stops re-querying after the configured number of tool rounds.
#[tokio::test]
async fn tool_rounds_are_bounded() {
    let mut h = harness(
        vec![
            tool_reply(&[("r1", "get_weather", "{}")]),
            tool_reply(&[("r2", "get_weather", "{}")]),
            tool_reply(&[("r3", "get_weather", "{}")]),
            tool_reply(&[("r4", "get_weather", "{}")]),
        ],
        &["get_weather"],
        &[("get_weather", Behavior::Reply("cloudy".into()))],
        &[],
    );

    let (result, events) = send(&mut h, "loop forever").await;
    match result.unwrap() {
        SessionStep::Answer(answer) => assert!(answer.contains("3 tool rounds")),
        other => panic!("expected answer, got {other:?}"),
    }
    assert_eq!(events.notices.len(), 1);
    assert_eq!(h.provider.requests().len(), 3);
    assert_eq!(count_tool_results(&h), 3);
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);
}

/// A reply with neither text nor tool calls yields a notice as the answer.
#[tokio::test]
async fn empty_reply_yields_notice() {
    let mut h = harness(
        vec![reply(
            ChatMessage {
                role: Role::Assistant,
                content: Some("  ".into()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            FinishReason::Stop,
        )],
        &[],
        &[],
        &[],
    );

    let (result, _) = send(&mut h, "hello").await;
    assert_eq!(result.unwrap(), SessionStep::Answer(EMPTY_REPLY_NOTICE.into()));

    // No tools offered means no tools field in the request
    assert!(h.provider.requests()[0].tools.is_none());
}

/// Blank lines never reach the model.
#[tokio::test]
async fn blank_input_is_ignored() {
    let mut h = harness(vec![], &[], &[], &[]);
    let (result, _) = send(&mut h, "   ").await;
    assert_eq!(result.unwrap(), SessionStep::Ignored);
    assert!(h.provider.requests().is_empty());
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);
}

/// A prompt-template result pulls the rendered prompt into the chat after
/// all tool results of that reply.
#[tokio::test]
async fn prompt_template_result_appends_prompt_messages() {
    let template_payload =
        r#"{"prompt_template":"weather_report","template_args":{"city":"Paris","days":3}}"#;
    let mut h = harness(
        vec![
            tool_reply(&[
                ("a", "prepare_report", "{}"),
                ("b", "get_weather", r#"{"city":"Paris"}"#),
            ]),
            text_reply("Here is your report."),
        ],
        &["prepare_report", "get_weather"],
        &[
            ("prepare_report", Behavior::Reply(template_payload.into())),
            ("get_weather", Behavior::Reply("cloudy".into())),
        ],
        &[(
            "weather_report",
            vec![PromptMessage {
                role: Role::User,
                text: "Write a 3-day report for Paris.".into(),
            }],
        )],
    );

    let (result, _) = send(&mut h, "report please").await;
    assert_eq!(
        result.unwrap(),
        SessionStep::Answer("Here is your report.".into())
    );

    let prompt_requests = h.server.prompt_requests.lock().unwrap().clone();
    assert_eq!(prompt_requests.len(), 1);
    assert_eq!(prompt_requests[0].0, "weather_report");
    assert_eq!(prompt_requests[0].1["days"], "3");

    let roles: Vec<Role> = h
        .session
        .conversation()
        .snapshot()
        .iter()
        .map(|t| t.role())
        .collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::User,
            Role::Assistant
        ]
    );
    for request in &h.provider.requests() {
        assert_transcript_balanced(request);
    }
}

/// A prompt that cannot be rendered is skipped without failing the turn.
#[tokio::test]
async fn failed_prompt_render_is_ignored() {
    let mut h = harness(
        vec![
            tool_reply(&[("a", "prepare_report", "{}")]),
            text_reply("Done."),
        ],
        &["prepare_report"],
        &[(
            "prepare_report",
            Behavior::Reply(r#"{"prompt_template":"missing","template_args":{}}"#.into()),
        )],
        &[],
    );

    let (result, _) = send(&mut h, "report").await;
    assert_eq!(result.unwrap(), SessionStep::Answer("Done.".into()));
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);
}

/// An API failure ends the turn but not the session.
#[tokio::test]
async fn api_error_keeps_session_open() {
    let mut h = harness(vec![], &[], &[], &[]);
    let (result, events) = send(&mut h, "hello").await;
    assert!(matches!(result, Err(BridgeError::Api(_))));
    assert_eq!(events.errors.len(), 1);
    assert_eq!(h.session.state(), SessionState::AwaitingUserInput);
}

/// Cancel arrives while a tool is running; the outstanding call is still
/// answered in the log.
#[tokio::test]
async fn cancel_mid_tool() {
    let in_flight = Arc::new(AtomicBool::new(false));
    let provider = Arc::new(MockProvider::new(
        vec![tool_reply(&[
            ("a", "hang", "{}"),
            ("b", "hang", "{}"),
        ])],
        Arc::clone(&in_flight),
    ));
    let server = Arc::new(MockServer::new(&[("hang", Behavior::Hang)], in_flight));
    let agent = Agent::new(
        provider.clone() as Arc<dyn Provider>,
        server as Arc<dyn ToolServer>,
        ToolCatalog::build(vec![descriptor("hang")]).unwrap(),
        "test-model".to_string(),
        1024,
    );
    let mut session = ChatSession::new(agent, "quit");

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let capture = Arc::new(Mutex::new(EventCapture::default()));
    let result = session
        .handle_input("hang please", cancel, EventCapture::callback(capture.clone()))
        .await;

    assert!(matches!(result, Err(BridgeError::Cancelled)));
    let c = capture.lock().unwrap();
    assert!(c.saw_cancelled);
    assert!(!c.saw_done);
    assert_eq!(c.tool_starts, vec!["hang"]);

    assert!(session.conversation().pending_call_ids().is_empty());
    let results = session
        .conversation()
        .snapshot()
        .iter()
        .filter(|t| matches!(t, ConversationTurn::ToolResult { .. }))
        .count();
    assert_eq!(results, 2);
}
