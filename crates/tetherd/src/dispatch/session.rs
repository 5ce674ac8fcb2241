//! Per-connection session loop.
//!
//! Each accepted connection is served synchronously: bytes are read into the
//! framer, every complete request unit is parsed and dispatched in arrival
//! order, and the response is written back before the next unit is taken.
//! Malformed units produce inline faults and the session continues; only
//! `quit`/`quitserver` and transport-level failures end it.

use std::io::{self, Read};
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::{debug, info, warn};

use tether_wire::{EventRecord, RequestEnvelope, ResponseEnvelope, WrappedValue};

use crate::broker::{Broker, Value, WrapContext};
use crate::framing::Framer;
use crate::process::ProcessTerminator;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::args;
use super::command::{Command, ConnectionCommand, RegistryOp};
use super::errors::DispatchError;
use super::response::ResponseWriter;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Maximum bytes buffered for a single request unit.
pub(crate) const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// What the session does after answering a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Keep serving this connection.
    Continue,
    /// Close this connection only.
    CloseConnection,
    /// Close this connection, then terminate the process.
    CloseServer,
}

/// Connection handler running the broker session loop.
///
/// One instance is shared by every connection; the broker it wraps owns the
/// process-wide registry and event queue, so handles minted on one
/// connection resolve on another.
pub struct BrokerConnectionHandler {
    broker: Arc<Broker>,
    terminator: Arc<dyn ProcessTerminator>,
}

impl std::fmt::Debug for BrokerConnectionHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BrokerConnectionHandler")
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandler for BrokerConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        if let Err(error) = self.serve(stream) {
            warn!(target: DISPATCH_TARGET, %error, "session ended with error");
        }
    }
}

impl BrokerConnectionHandler {
    /// Creates a handler over the shared broker and termination seam.
    pub fn new(broker: Arc<Broker>, terminator: Arc<dyn ProcessTerminator>) -> Self {
        Self { broker, terminator }
    }

    fn serve(&self, mut stream: ConnectionStream) -> Result<(), DispatchError> {
        let mut framer = Framer::new();
        let mut chunk = [0_u8; 1024];

        loop {
            let bytes_read = read_with_retry(&mut stream, &mut chunk)?;
            if bytes_read == 0 {
                debug!(target: DISPATCH_TARGET, "client closed the connection");
                return Ok(());
            }
            framer.extend(&chunk[..bytes_read]);

            if framer.buffered() > MAX_REQUEST_BYTES {
                let error = DispatchError::request_too_large(framer.buffered(), MAX_REQUEST_BYTES);
                let mut writer = ResponseWriter::new(&mut stream);
                let _ = writer.write_envelope(&error.to_envelope(None));
                return Err(error);
            }

            while let Some(unit) = framer.next_request() {
                match self.serve_unit(&mut stream, &unit)? {
                    Flow::Continue => {}
                    Flow::CloseConnection => {
                        debug!(target: DISPATCH_TARGET, "closing connection on quit");
                        let _ = stream.shutdown();
                        return Ok(());
                    }
                    Flow::CloseServer => {
                        info!(
                            target: DISPATCH_TARGET,
                            "quitserver requested; closing socket and terminating"
                        );
                        let _ = stream.shutdown();
                        self.terminator.terminate();
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Parses and dispatches one request unit, writing its response.
    ///
    /// Per-request faults are framed inline and the session continues; only
    /// IO failures propagate.
    fn serve_unit(&self, stream: &mut ConnectionStream, unit: &[u8]) -> Result<Flow, DispatchError> {
        let mut writer = ResponseWriter::new(&mut *stream);

        let request: RequestEnvelope = match serde_json::from_slice(unit) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request unit");
                let fault = DispatchError::malformed(error);
                writer.write_envelope(&fault.to_envelope(None))?;
                return Ok(Flow::Continue);
            }
        };
        let msgid = request.msgid.clone();

        let Some(name) = request.command.as_deref() else {
            writer.write_envelope(&DispatchError::MissingCommand.to_envelope(msgid))?;
            return Ok(Flow::Continue);
        };

        let command = match Command::parse(name) {
            Ok(command) => command,
            Err(error) => {
                debug!(target: DISPATCH_TARGET, command = name, "unknown command");
                writer.write_envelope(&error.to_envelope(msgid))?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::Connection(ConnectionCommand::Echo) => {
                writer.write_verbatim(unit)?;
                Ok(Flow::Continue)
            }
            Command::Connection(ConnectionCommand::Quit) => {
                writer.write_envelope(&ResponseEnvelope::ok_empty(msgid))?;
                Ok(Flow::CloseConnection)
            }
            Command::Connection(ConnectionCommand::QuitServer) => {
                writer.write_envelope(&ResponseEnvelope::ok_empty(msgid))?;
                Ok(Flow::CloseServer)
            }
            Command::Registry(op) => {
                let envelope = self.execute_framed(op, &request, msgid);
                writer.write_envelope(&envelope)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Executes a registry operation and frames the outcome, catching every
    /// dispatch error into an error envelope.
    fn execute_framed(
        &self,
        op: RegistryOp,
        request: &RequestEnvelope,
        msgid: Option<Json>,
    ) -> ResponseEnvelope {
        let Some(positional) = request.positional() else {
            let error =
                DispatchError::invalid_arguments(op.as_str(), "args must be a positional array");
            return error.to_envelope(msgid);
        };

        match self.execute(op, positional) {
            Ok(Some((result, events))) => ResponseEnvelope::ok(result, msgid).with_events(events),
            Ok(None) => ResponseEnvelope::ok_empty(msgid),
            Err(error) => {
                debug!(target: DISPATCH_TARGET, command = op.as_str(), %error, "operation failed");
                error.to_envelope(msgid)
            }
        }
    }

    /// Runs one registry operation.
    ///
    /// Returns the wrapped payload plus drained events for value-bearing
    /// operations, `None` for plain ok/null responses.
    fn execute(
        &self,
        op: RegistryOp,
        args: &[Json],
    ) -> Result<Option<(WrappedValue, Vec<EventRecord>)>, DispatchError> {
        let marshaler = self.broker.marshaler();
        match op {
            RegistryOp::Link => {
                let value = Value::from_json(args::required(args, 0, op)?.clone());
                Ok(Some(marshaler.wrap_results(value, WrapContext::Single)))
            }
            RegistryOp::Unlink => {
                let handles = args::handle_list(args, op)?;
                self.broker.unlink(&handles);
                Ok(None)
            }
            RegistryOp::Purge => {
                self.broker.purge();
                Ok(None)
            }
            RegistryOp::GetAttr => {
                let handle = args::handle(args, 0, op)?;
                let name = args::text(args, 1, op)?;
                let value = self.broker.get_attr(handle, name)?;
                Ok(Some(marshaler.wrap_results(value, WrapContext::Single)))
            }
            RegistryOp::SetAttr => {
                let handle = args::handle(args, 0, op)?;
                let name = args::text(args, 1, op)?;
                let arg = args::tagged(args, 2, op)?;
                let value = self.broker.set_attr(handle, name, &arg)?;
                Ok(Some(marshaler.wrap_results(value, WrapContext::Single)))
            }
            RegistryOp::Dive => {
                let handle = args::handle(args, 0, op)?;
                let steps = args::step_list(args, 1, op)?;
                let value = self.broker.dive(handle, &steps)?;
                Ok(Some(marshaler.wrap_results(value, WrapContext::Single)))
            }
            RegistryOp::CallThis => {
                let handle = args::handle(args, 0, op)?;
                let call_args = args::tagged_list(args, 1, op)?;
                let context = args::wrap_context(args, 2, op)?;
                let value = self.broker.call_this(handle, &call_args)?;
                Ok(Some(marshaler.wrap_results(value, context)))
            }
            RegistryOp::CallMethod => {
                let handle = args::handle(args, 0, op)?;
                let name = args::text(args, 1, op)?;
                let call_args = args::tagged_list(args, 2, op)?;
                let value = self.broker.call_method(handle, name, &call_args)?;
                Ok(Some(marshaler.wrap_results(value, WrapContext::Single)))
            }
            RegistryOp::CatchEvent => {
                let subject = args::handle(args, 0, op)?;
                let callback = self.broker.catch_event(subject)?;
                Ok(Some(marshaler.wrap_results(callback, WrapContext::Single)))
            }
            RegistryOp::Eval => {
                let expression = args::text(args, 0, op)?;
                let context = args::wrap_context(args, 1, op)?;
                match self.broker.evaluate(expression) {
                    Ok(value) => Ok(Some(marshaler.wrap_results(value, context))),
                    Err(fault) => Err(DispatchError::eval(fault, expression)),
                }
            }
            RegistryOp::QueuedEval => {
                let expression = args::text(args, 0, op)?;
                self.broker.evaluate_queued(expression);
                Ok(None)
            }
        }
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(stream: &mut ConnectionStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use rstest::{fixture, rstest};
    use serde_json::json;

    use crate::broker::LiteralEvaluator;

    use super::*;

    /// Terminator that records the request instead of exiting.
    #[derive(Debug, Default)]
    struct FlagTerminator {
        fired: AtomicBool,
    }

    impl ProcessTerminator for FlagTerminator {
        fn terminate(&self) {
            self.fired.store(true, Ordering::SeqCst);
        }
    }

    /// One live session over TCP: a server thread running the handler and a
    /// client socket driving it.
    struct SessionHarness {
        client: TcpStream,
        reader: BufReader<TcpStream>,
        server: Option<JoinHandle<()>>,
        terminator: Arc<FlagTerminator>,
    }

    impl SessionHarness {
        fn send_raw(&mut self, bytes: &[u8]) {
            self.client.write_all(bytes).expect("write request");
            self.client.flush().expect("flush request");
        }

        fn send_line(&mut self, line: &str) {
            self.send_raw(line.as_bytes());
            self.send_raw(b"\n");
        }

        fn read_line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).expect("read response");
            line.trim_end().to_owned()
        }

        fn read_json(&mut self) -> Json {
            let line = self.read_line();
            serde_json::from_str(&line).expect("response is json")
        }

        fn roundtrip(&mut self, line: &str) -> Json {
            self.send_line(line);
            self.read_json()
        }

        fn expect_closed(&mut self) {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).expect("read after close");
            assert_eq!(read, 0, "connection should be closed");
        }

        fn join(mut self) {
            drop(self.client);
            drop(self.reader);
            if let Some(server) = self.server.take() {
                server.join().expect("join server thread");
            }
        }
    }

    #[fixture]
    fn harness() -> SessionHarness {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");

        let terminator = Arc::new(FlagTerminator::default());
        let broker = Arc::new(Broker::new(Arc::new(LiteralEvaluator)));
        let handler = BrokerConnectionHandler::new(broker, Arc::clone(&terminator) as Arc<dyn ProcessTerminator>);

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            handler.handle(ConnectionStream::Tcp(stream));
        });

        let client = TcpStream::connect(addr).expect("connect");
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        let reader = BufReader::new(client.try_clone().expect("clone client"));

        SessionHarness {
            client,
            reader,
            server: Some(server),
            terminator,
        }
    }

    #[rstest]
    fn echo_writes_the_request_back_verbatim(mut harness: SessionHarness) {
        harness.send_line(r#"{"command":"echo","args":{"x":1}}"#);
        assert_eq!(harness.read_line(), r#"{"command":"echo","args":{"x":1}}"#);
        harness.join();
    }

    #[rstest]
    fn link_returns_the_first_handle_of_a_fresh_registry(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"link","args":[{}],"msgid":7}"#);
        assert_eq!(
            response,
            json!({
                "status": "ok",
                "result": {"result": 1, "type": "object"},
                "msgid": 7,
            })
        );
        harness.join();
    }

    #[rstest]
    fn unknown_commands_fault_without_closing(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"noSuchOp","args":[]}"#);
        assert_eq!(response.get("status"), Some(&json!("error")));
        assert!(
            response
                .get("error")
                .and_then(Json::as_str)
                .is_some_and(|message| message.contains("unknown command"))
        );

        // The connection keeps serving.
        let next = harness.roundtrip(r#"{"command":"link","args":[{}]}"#);
        assert_eq!(next.get("status"), Some(&json!("ok")));
        harness.join();
    }

    #[rstest]
    fn malformed_json_faults_inline_and_parsing_continues(mut harness: SessionHarness) {
        harness.send_line("not json at all");
        let fault = harness.read_json();
        assert_eq!(fault.get("status"), Some(&json!("error")));

        let next = harness.roundtrip(r#"{"command":"link","args":[{}]}"#);
        assert_eq!(next.get("status"), Some(&json!("ok")));
        harness.join();
    }

    #[rstest]
    fn requests_split_across_chunks_dispatch_once(mut harness: SessionHarness) {
        harness.send_raw(br#"{"command":"ech"#);
        thread::sleep(Duration::from_millis(50));
        harness.send_raw(b"o\",\"args\":[]}\n");
        assert_eq!(harness.read_line(), r#"{"command":"echo","args":[]}"#);
        harness.join();
    }

    #[rstest]
    fn quit_closes_only_this_connection(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"quit"}"#);
        assert_eq!(response, json!({"status": "ok", "result": null}));
        harness.expect_closed();
        assert!(!harness.terminator.fired.load(Ordering::SeqCst));
        harness.join();
    }

    #[rstest]
    fn quitserver_closes_and_requests_process_termination(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"quitserver"}"#);
        assert_eq!(response, json!({"status": "ok", "result": null}));
        harness.expect_closed();
        // The server thread calls `terminate()` after closing the socket, so
        // joining it first removes the race between that call and observing the
        // flag (the socket close that unblocks `expect_closed` precedes it).
        if let Some(server) = harness.server.take() {
            server.join().expect("join server thread");
        }
        assert!(harness.terminator.fired.load(Ordering::SeqCst));
        harness.join();
    }

    #[rstest]
    fn attributes_round_trip_through_the_wire(mut harness: SessionHarness) {
        let linked = harness.roundtrip(r#"{"command":"link","args":[{"a":5}]}"#);
        assert_eq!(
            linked.pointer("/result/result").and_then(Json::as_u64),
            Some(1)
        );

        let read = harness.roundtrip(r#"{"command":"getattr","args":[1,"a"]}"#);
        assert_eq!(
            read.pointer("/result"),
            Some(&json!({"result": 5, "type": null}))
        );

        let written =
            harness.roundtrip(r#"{"command":"setattr","args":[1,"b",{"t":"v","v":"hi"}]}"#);
        assert_eq!(
            written.pointer("/result"),
            Some(&json!({"result": "hi", "type": null}))
        );

        let dived = harness.roundtrip(r#"{"command":"dive","args":[1,["b"]]}"#);
        assert_eq!(
            dived.pointer("/result"),
            Some(&json!({"result": "hi", "type": null}))
        );
        harness.join();
    }

    #[rstest]
    fn dive_faults_name_the_failing_step(mut harness: SessionHarness) {
        harness.send_line(r#"{"command":"link","args":[{"a":{"b":1}}]}"#);
        harness.read_json();

        let fault = harness.roundtrip(r#"{"command":"dive","args":[1,["a","missing"]]}"#);
        assert_eq!(fault.get("status"), Some(&json!("error")));
        assert!(
            fault
                .get("error")
                .and_then(Json::as_str)
                .is_some_and(|message| message.contains("missing"))
        );
        harness.join();
    }

    #[rstest]
    fn unknown_handles_fault_inline(mut harness: SessionHarness) {
        let fault = harness.roundtrip(r#"{"command":"getattr","args":[99,"a"],"msgid":"m"}"#);
        assert_eq!(
            fault,
            json!({"status": "error", "error": "unknown handle: 99", "msgid": "m"})
        );
        harness.join();
    }

    #[rstest]
    fn events_ride_on_the_next_response_exactly_once(mut harness: SessionHarness) {
        harness.send_line(r#"{"command":"link","args":[{}]}"#);
        harness.read_json();
        let minted = harness.roundtrip(r#"{"command":"catchevent","args":[1]}"#);
        assert_eq!(
            minted.pointer("/result/type"),
            Some(&json!("function"))
        );
        let callback = minted
            .pointer("/result/result")
            .and_then(Json::as_u64)
            .expect("callback handle");

        // Firing queues an event; the firing's own response carries it.
        let fired = harness.roundtrip(&format!(
            r#"{{"command":"callthis","args":[{callback},[{{"t":"v","v":"ding"}}]]}}"#
        ));
        let events = fired.get("events").and_then(Json::as_array).expect("events");
        assert_eq!(events.len(), 1);
        let event = events.first().expect("one event");
        assert_eq!(event.get("cbid"), Some(&json!(1)));
        let args_handle = event.get("args").and_then(Json::as_u64).expect("args handle");

        // The queue drained: the next response carries no events key.
        let quiet = harness.roundtrip(r#"{"command":"link","args":[1]}"#);
        assert_eq!(quiet.get("events"), None);

        // The linked argument list resolves through the registry.
        let args = harness.roundtrip(&format!(
            r#"{{"command":"dive","args":[{args_handle},[0]]}}"#
        ));
        assert_eq!(
            args.pointer("/result"),
            Some(&json!({"result": "ding", "type": null}))
        );
        harness.join();
    }

    #[rstest]
    fn eval_faults_use_the_evaluation_envelope(mut harness: SessionHarness) {
        let fault = harness.roundtrip(r#"{"command":"eval","args":["{broken"]}"#);
        assert_eq!(fault.get("status"), Some(&json!("error")));
        assert_eq!(fault.get("name"), Some(&json!("SyntaxFault")));
        assert_eq!(fault.get("command"), Some(&json!("{broken")));
        assert!(fault.get("message").is_some());
        harness.join();
    }

    #[rstest]
    fn qeval_swallows_faults_and_acknowledges(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"qeval","args":["{broken"]}"#);
        assert_eq!(response, json!({"status": "ok", "result": null}));
        harness.join();
    }

    #[rstest]
    fn eval_wraps_literal_results(mut harness: SessionHarness) {
        let response = harness.roundtrip(r#"{"command":"eval","args":["[1,2]","list"]}"#);
        assert_eq!(
            response.pointer("/result"),
            Some(&json!({
                "result": [
                    {"result": 1, "type": null},
                    {"result": 2, "type": null},
                ],
                "type": "list",
            }))
        );
        harness.join();
    }

    #[rstest]
    fn unlink_and_purge_return_plain_ok(mut harness: SessionHarness) {
        harness.send_line(r#"{"command":"link","args":[{}]}"#);
        harness.read_json();

        let unlinked = harness.roundtrip(r#"{"command":"unlink","args":[1],"msgid":2}"#);
        assert_eq!(unlinked, json!({"status": "ok", "result": null, "msgid": 2}));

        let purged = harness.roundtrip(r#"{"command":"purge"}"#);
        assert_eq!(purged, json!({"status": "ok", "result": null}));

        // Purge reset allocation: the next link is handle 1 again.
        let relinked = harness.roundtrip(r#"{"command":"link","args":[{}]}"#);
        assert_eq!(
            relinked.pointer("/result/result").and_then(Json::as_u64),
            Some(1)
        );
        harness.join();
    }
}
