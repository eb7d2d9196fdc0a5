//! Test doubles shared by the unit tests.
use crate::{Args, CacheEntry, FetchError, Transport};
use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::Value as JsonValue;
use std::{cell::RefCell, rc::Rc};

type Reply = oneshot::Sender<Result<JsonValue, FetchError>>;

/// Transport whose calls stay in flight until the test answers them.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: RefCell<Vec<(String, Args, Option<Reply>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Rc<Self> {
        Rc::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn operation(&self, index: usize) -> String {
        self.calls.borrow()[index].0.clone()
    }

    pub fn args(&self, index: usize) -> Args {
        self.calls.borrow()[index].1.clone()
    }

    /// Answer call number `index`.
    pub fn reply(&self, index: usize, result: Result<JsonValue, FetchError>) {
        let sender = self.calls.borrow_mut()[index]
            .2
            .take()
            .expect("call already answered");
        sender.send(result).expect("caller went away");
    }
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    async fn call(&self, operation: &str, args: &Args) -> Result<JsonValue, FetchError> {
        let (sender, receiver) = oneshot::channel();
        self.calls
            .borrow_mut()
            .push((operation.into(), args.clone(), Some(sender)));
        receiver
            .await
            .unwrap_or_else(|_| Err(FetchError::TransportFailure("reply dropped".into())))
    }
}

/// Records every entry a subscriber is notified with.
pub fn recorder() -> (Rc<RefCell<Vec<CacheEntry>>>, impl Fn(&CacheEntry) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |entry: &CacheEntry| sink.borrow_mut().push(entry.clone()))
}
