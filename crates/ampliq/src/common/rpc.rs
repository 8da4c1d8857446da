use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};

/// One-shot reply channel carried inside a request message. The receiving
/// side of the queue resolves it with `respond`.
#[must_use = "response token should be used to respond to a request"]
pub struct ResponseToken<T> {
    sender: oneshot::Sender<T>,
}

impl<T> ResponseToken<T> {
    /// Creates a token together with the receiver that will yield the
    /// response.
    pub fn make() -> (ResponseToken<T>, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        (ResponseToken { sender }, receiver)
    }

    pub fn respond(self, response: T) {
        if self.sender.send(response).is_err() {
            log::warn!("Could not send response to RPC method, the other end hung up");
        }
    }
}

impl<T> Debug for ResponseToken<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Response token")
    }
}

pub type RpcSender<T> = mpsc::UnboundedSender<T>;
pub type RpcReceiver<T> = mpsc::UnboundedReceiver<T>;

pub fn make_rpc_queue<T>() -> (RpcSender<T>, RpcReceiver<T>) {
    mpsc::unbounded_channel()
}
