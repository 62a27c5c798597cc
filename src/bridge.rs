use std::mem::take;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, trace};

use crate::error::ParseError;
use crate::event::{XmlElement, XmlEvent};
use crate::handler::{Control, SaxHandler};
use crate::source::Position;
use crate::tokenizer::Tokenizer;

/// Which side of the handshake owns the slot, mirroring a two-valued
/// condition lock: the consumer hands the slot to the worker by flipping to
/// `Requested`, the worker hands it back by flipping to `Provided`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requested,
    Provided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Parsing,
    Aborted,
    Ended,
}

/// Everything the two threads share. Only ever touched with the mutex held.
#[derive(Debug)]
struct Shared {
    phase: Phase,
    state: State,
    slot: Option<Result<XmlEvent, ParseError>>,
    depth: usize,
    position: Position,
}

#[derive(Debug)]
struct Rendezvous {
    shared: Mutex<Shared>,
    condvar: Condvar,
}

impl Rendezvous {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // a poisoned lock means the worker panicked mid-delivery; the state
        // machine is still usable for teardown
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// The push-to-pull bridge: one tokenizer, one worker thread, one slot.
///
/// The consumer side calls [`PullSession::request_event`] and
/// [`PullSession::abort`]; the worker side runs [`Tokenizer::parse`] and
/// feeds the slot through [`BridgeHandler`]. The worker is spawned lazily on
/// the first request and never advances past a delivered event until the
/// consumer requests the next one.
pub(crate) struct PullSession {
    rendezvous: Arc<Rendezvous>,
    /// Present until the worker is spawned, then moved into it.
    tokenizer: Option<Tokenizer>,
    worker: Option<thread::JoinHandle<()>>,
    process_namespaces: bool,
}

impl PullSession {
    pub(crate) fn new(tokenizer: Tokenizer) -> Self {
        PullSession {
            rendezvous: Arc::new(Rendezvous {
                shared: Mutex::new(Shared {
                    phase: Phase::Requested,
                    state: State::NotStarted,
                    slot: None,
                    depth: 0,
                    position: Position::default(),
                }),
                condvar: Condvar::new(),
            }),
            process_namespaces: tokenizer.process_namespaces(),
            tokenizer: Some(tokenizer),
            worker: None,
        }
    }

    /// Whether the first request has already handed the tokenizer to the
    /// worker.
    pub(crate) fn started(&self) -> bool {
        self.tokenizer.is_none()
    }

    pub(crate) fn process_namespaces(&self) -> bool {
        self.process_namespaces
    }

    /// Flip the tokenizer's namespace mode. Fails once parsing has started
    /// and the tokenizer is no longer ours to touch.
    pub(crate) fn set_process_namespaces(&mut self, yes: bool) -> bool {
        match self.tokenizer.as_mut() {
            Some(tokenizer) => {
                tokenizer.set_process_namespaces(yes);
                self.process_namespaces = yes;
                true
            }
            None => false,
        }
    }

    /// Depth of the most recently delivered event; 0 at both document
    /// boundaries.
    pub(crate) fn depth(&self) -> usize {
        self.rendezvous.lock().depth
    }

    /// Cursor position as of the most recently delivered event or error.
    pub(crate) fn position(&self) -> Position {
        self.rendezvous.lock().position
    }

    /// Block until the next event is available and return it.
    ///
    /// The first call spawns the worker. After an error or `EndDocument`, and
    /// after [`PullSession::abort`], this returns `EndDocument` without
    /// driving the tokenizer any further.
    pub(crate) fn request_event(&mut self) -> Result<XmlEvent, ParseError> {
        let mut shared = self.rendezvous.lock();
        match shared.state {
            State::NotStarted => {
                shared.state = State::Parsing;
                shared.phase = Phase::Requested;
                let tokenizer = match self.tokenizer.take() {
                    Some(tokenizer) => tokenizer,
                    None => {
                        shared.state = State::Ended;
                        return Ok(XmlEvent::EndDocument);
                    }
                };
                let rendezvous = Arc::clone(&self.rendezvous);
                match thread::Builder::new()
                    .name("saxpull-worker".into())
                    .spawn(move || worker_main(tokenizer, rendezvous))
                {
                    Ok(handle) => self.worker = Some(handle),
                    Err(error) => {
                        shared.state = State::Ended;
                        return Err(ParseError::io(error, Position::default()));
                    }
                }
            }
            State::Parsing => {
                shared.phase = Phase::Requested;
                self.rendezvous.condvar.notify_all();
            }
            State::Aborted | State::Ended => return Ok(XmlEvent::EndDocument),
        }

        while shared.phase != Phase::Provided {
            shared = self.rendezvous.wait(shared);
        }

        match shared.slot.take() {
            Some(Ok(XmlEvent::EndDocument)) => {
                shared.state = State::Ended;
                drop(shared);
                self.join_worker();
                Ok(XmlEvent::EndDocument)
            }
            Some(Ok(event)) => Ok(event),
            Some(Err(error)) => {
                shared.state = State::Ended;
                drop(shared);
                self.join_worker();
                Err(error)
            }
            // only the abort acknowledgement provides an empty slot, and
            // abort never races with a request on the single consumer thread
            None => {
                shared.state = State::Ended;
                Ok(XmlEvent::EndDocument)
            }
        }
    }

    /// Request termination and block until the worker has stopped touching
    /// the tokenizer. Idempotent; a no-op unless currently parsing.
    pub(crate) fn abort(&mut self) {
        {
            let mut shared = self.rendezvous.lock();
            if shared.state != State::Parsing {
                return;
            }
            debug!("aborting parse session");
            shared.state = State::Aborted;
            shared.phase = Phase::Requested;
            self.rendezvous.condvar.notify_all();
            while shared.phase != Phase::Provided {
                shared = self.rendezvous.wait(shared);
            }
        }
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            // past its last rendezvous, the worker exits promptly
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for PullSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullSession")
            .field("started", &self.started())
            .finish()
    }
}

impl Drop for PullSession {
    fn drop(&mut self) {
        self.abort();
        self.join_worker();
    }
}

fn worker_main(mut tokenizer: Tokenizer, rendezvous: Arc<Rendezvous>) {
    trace!("parse worker started");
    let mut handler = BridgeHandler {
        rendezvous: &rendezvous,
        text: String::new(),
        depth: 0,
    };
    match tokenizer.parse(&mut handler) {
        Ok(()) => trace!("parse worker finished"),
        Err(error) => {
            debug!("parse failed: {}", error);
            let pos = error.position();
            handler.deliver_terminal(Err(error), pos);
        }
    }
}

/// The worker-side [`SaxHandler`]: translates callbacks into events,
/// coalesces character runs, keeps the depth counter, and parks the worker
/// after every delivery.
struct BridgeHandler<'a> {
    rendezvous: &'a Rendezvous,
    /// Accumulator for adjacent text/CDATA callbacks. Empty at every wait
    /// point: it is flushed (with its own delivery) before anything else is
    /// delivered, so an abort can never strand buffered text at a rendezvous.
    text: String,
    depth: usize,
}

impl BridgeHandler<'_> {
    /// Put one event in the slot, wake the consumer, and park until the next
    /// request. Returns `Stop` if the wakeup was an abort.
    fn deliver(&mut self, event: XmlEvent, pos: Position) -> Control {
        let mut shared = self.rendezvous.lock();
        shared.slot = Some(Ok(event));
        shared.depth = self.depth;
        shared.position = pos;
        shared.phase = Phase::Provided;
        self.rendezvous.condvar.notify_all();

        while shared.phase != Phase::Requested {
            shared = self.rendezvous.wait(shared);
        }
        if shared.state == State::Aborted {
            // release the consumer blocked in abort(); after this the worker
            // never touches the shared state again
            shared.phase = Phase::Provided;
            self.rendezvous.condvar.notify_all();
            Control::Stop
        } else {
            Control::Continue
        }
    }

    /// Deliver without parking afterwards: the final `EndDocument` and
    /// errors, after which the worker has nothing left to do.
    fn deliver_terminal(&mut self, reply: Result<XmlEvent, ParseError>, pos: Position) {
        let mut shared = self.rendezvous.lock();
        shared.position = pos;
        shared.depth = self.depth;
        shared.slot = Some(reply);
        shared.phase = Phase::Provided;
        self.rendezvous.condvar.notify_all();
    }

    fn flush_text(&mut self, pos: Position) -> Control {
        if self.text.is_empty() {
            return Control::Continue;
        }
        let text = take(&mut self.text);
        self.deliver(XmlEvent::Characters(text), pos)
    }
}

impl SaxHandler for BridgeHandler<'_> {
    fn document_started(&mut self, pos: Position) -> Control {
        self.deliver(XmlEvent::StartDocument, pos)
    }

    fn element_started(&mut self, element: XmlElement, pos: Position) -> Control {
        if self.flush_text(pos) == Control::Stop {
            return Control::Stop;
        }
        self.depth += 1;
        self.deliver(XmlEvent::StartElement(element), pos)
    }

    fn element_ended(
        &mut self,
        name: &str,
        namespace_uri: Option<&str>,
        pos: Position,
    ) -> Control {
        if self.flush_text(pos) == Control::Stop {
            return Control::Stop;
        }
        let control = self.deliver(
            XmlEvent::EndElement {
                name: name.to_owned(),
                namespace_uri: namespace_uri.map(str::to_owned),
            },
            pos,
        );
        // published with the next delivery, so a consumer holding this end
        // tag still observes the deeper level
        self.depth -= 1;
        control
    }

    fn text(&mut self, chunk: &str, _pos: Position) -> Control {
        self.text.push_str(chunk);
        Control::Continue
    }

    fn cdata(&mut self, data: &str, _pos: Position) -> Control {
        self.text.push_str(data);
        Control::Continue
    }

    fn document_ended(&mut self, pos: Position) {
        if self.flush_text(pos) == Control::Stop {
            return;
        }
        self.deliver_terminal(Ok(XmlEvent::EndDocument), pos);
    }
}
