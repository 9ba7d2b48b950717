//! Single-thread execution context for rich-text parsing
//!
//! Some rich-text parsers are only usable from one fixed thread. The worker
//! owns the parser on a dedicated thread and serves requests from a queue in
//! submission order. Blocking callers wait without a timeout, so a parser that
//! never returns stalls every caller.

use std::sync::mpsc;
use std::thread::{self, ThreadId};

use tokio::sync::oneshot;
use tracing::{debug, error};

use super::{ParseError, RichTextParser, StyledRun};

enum Request {
    Parse(String),
    PlainText(String),
}

enum Response {
    Runs(Result<Vec<StyledRun>, ParseError>),
    Text(Result<String, ParseError>),
}

enum Reply {
    Blocking(mpsc::SyncSender<Response>),
    Async(oneshot::Sender<Response>),
}

struct Job {
    request: Request,
    reply: Reply,
}

/// Handle to a parser running on its own thread
///
/// Cloning is cheap; the thread exits once every handle is dropped.
#[derive(Clone)]
pub struct ParserWorker {
    jobs: mpsc::Sender<Job>,
    thread_id: ThreadId,
}

impl ParserWorker {
    /// Move `parser` onto a new worker thread
    pub fn spawn<P: RichTextParser>(mut parser: P) -> Result<Self, ParseError> {
        let (jobs, queue) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name("rich-text-parser".to_string())
            .spawn(move || {
                debug!("Rich-text parser worker started");
                for job in queue {
                    let response = match job.request {
                        Request::Parse(input) => Response::Runs(parser.parse(&input)),
                        Request::PlainText(input) => Response::Text(parser.plain_text(&input)),
                    };
                    // A caller that gave up waiting is not an error.
                    match job.reply {
                        Reply::Blocking(tx) => {
                            let _ = tx.send(response);
                        }
                        Reply::Async(tx) => {
                            let _ = tx.send(response);
                        }
                    }
                }
                debug!("Rich-text parser worker stopped");
            })?;

        Ok(Self {
            jobs,
            thread_id: handle.thread().id(),
        })
    }

    /// Parse `input`, blocking the calling thread until the worker answers
    pub fn parse_blocking(&self, input: &str) -> Result<Vec<StyledRun>, ParseError> {
        match self.submit_blocking(Request::Parse(input.to_string()))? {
            Response::Runs(result) => result,
            Response::Text(_) => Err(ParseError::WorkerUnavailable),
        }
    }

    /// Plain text of `input`, blocking the calling thread
    pub fn plain_text_blocking(&self, input: &str) -> Result<String, ParseError> {
        match self.submit_blocking(Request::PlainText(input.to_string()))? {
            Response::Text(result) => result,
            Response::Runs(_) => Err(ParseError::WorkerUnavailable),
        }
    }

    /// Parse `input` without blocking the async runtime
    pub async fn parse(&self, input: &str) -> Result<Vec<StyledRun>, ParseError> {
        match self.submit(Request::Parse(input.to_string())).await? {
            Response::Runs(result) => result,
            Response::Text(_) => Err(ParseError::WorkerUnavailable),
        }
    }

    /// Plain text of `input` without blocking the async runtime
    pub async fn plain_text(&self, input: &str) -> Result<String, ParseError> {
        match self.submit(Request::PlainText(input.to_string())).await? {
            Response::Text(result) => result,
            Response::Runs(_) => Err(ParseError::WorkerUnavailable),
        }
    }

    fn submit_blocking(&self, request: Request) -> Result<Response, ParseError> {
        // Waiting on our own queue from the worker thread would never return.
        if thread::current().id() == self.thread_id {
            return Err(ParseError::Reentrant);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.send(Job {
            request,
            reply: Reply::Blocking(tx),
        })?;
        rx.recv().map_err(|_| ParseError::WorkerUnavailable)
    }

    async fn submit(&self, request: Request) -> Result<Response, ParseError> {
        let (tx, rx) = oneshot::channel();
        self.send(Job {
            request,
            reply: Reply::Async(tx),
        })?;
        rx.await.map_err(|_| ParseError::WorkerUnavailable)
    }

    fn send(&self, job: Job) -> Result<(), ParseError> {
        self.jobs.send(job).map_err(|_| {
            error!("Rich-text parser worker is not running");
            ParseError::WorkerUnavailable
        })
    }
}
