//! Sending upload requests.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

use crate::api::RepositoryClient;
use crate::enc_string::EncodedString;
use crate::error::Result;
use crate::http::HttpResponse;

/// Bytes handed to the connection per body piece, and progress granularity.
const BODY_PIECE_SIZE: usize = 64 * 1024;

/// Headers identifying the file of an upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkHeaders {
    /// First request of a file.
    Identity {
        name: EncodedString,
        size: u64,
        timestamp: i64,
        mimetype: EncodedString,
        /// Destination directory on the server.
        path: EncodedString,
        description: Option<EncodedString>,
    },
    /// Later requests, once the server assigned a stream.
    Token(String),
}

impl ChunkHeaders {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            ChunkHeaders::Identity {
                name,
                size,
                timestamp,
                mimetype,
                path,
                description,
            } => {
                let mut pairs = vec![
                    ("content-name", name.encoded().to_string()),
                    ("content-size", size.to_string()),
                    ("content-timestamp", timestamp.to_string()),
                    ("content-mimetype", mimetype.encoded().to_string()),
                    ("content-path", path.encoded().to_string()),
                ];
                if let Some(description) = description {
                    pairs.push(("content-description", description.encoded().to_string()));
                }
                pairs
            }
            ChunkHeaders::Token(token) => vec![("content-token", token.clone())],
        }
    }
}

/// One upload request: a chunk of bytes, or an empty processing poll.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub url: String,
    pub headers: ChunkHeaders,
    pub body: Vec<u8>,
}

/// Carries upload requests to the server.
///
/// Implementations report the number of body bytes sent so far on
/// `progress`. Dropping the returned future aborts the request.
pub trait UploadTransport: Send + Sync {
    fn send_chunk(
        &self,
        request: ChunkRequest,
        progress: UnboundedSender<u64>,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl UploadTransport for RepositoryClient {
    async fn send_chunk(&self, request: ChunkRequest, progress: UnboundedSender<u64>) -> Result<HttpResponse> {
        let headers = request.headers.to_pairs();
        let total = request.body.len() as u64;
        let body = if request.body.is_empty() {
            reqwest::Body::from(Vec::new())
        } else {
            let pieces: Vec<Vec<u8>> = request.body.chunks(BODY_PIECE_SIZE).map(<[u8]>::to_vec).collect();
            let mut sent = 0u64;
            let stream = stream::iter(pieces).map(move |piece| {
                sent += piece.len() as u64;
                let _ = progress.send(sent.min(total));
                Ok::<_, std::io::Error>(piece)
            });
            reqwest::Body::wrap_stream(stream)
        };
        self.http().post_body(&request.url, &headers, body).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::ReposError;

    /// What the mock does with one request.
    pub enum Reply {
        Respond(HttpResponse),
        Fail(ReposError),
        /// Never answers.
        Hang,
        /// Answers after a delay.
        Delayed(Duration, HttpResponse),
    }

    #[derive(Default)]
    pub struct MockTransport {
        replies: Mutex<VecDeque<Reply>>,
        pub requests: Mutex<Vec<ChunkRequest>>,
    }

    impl MockTransport {
        pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn push(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn sent(&self) -> Vec<ChunkRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl UploadTransport for MockTransport {
        async fn send_chunk(&self, request: ChunkRequest, progress: UnboundedSender<u64>) -> Result<HttpResponse> {
            let len = request.body.len() as u64;
            self.requests.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().pop_front();
            let _ = progress.send(len);
            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(error)) => Err(error),
                Some(Reply::Delayed(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(ReposError::Custom("no scripted reply".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_headers() {
        let headers = ChunkHeaders::Identity {
            name: EncodedString::from_plain("my file.txt"),
            size: 42,
            timestamp: 1700,
            mimetype: EncodedString::from_plain("text/plain"),
            path: EncodedString::from_plain("/docs/a b/"),
            description: None,
        };
        assert_eq!(
            headers.to_pairs(),
            vec![
                ("content-name", "my%20file.txt".to_string()),
                ("content-size", "42".to_string()),
                ("content-timestamp", "1700".to_string()),
                ("content-mimetype", "text%2Fplain".to_string()),
                ("content-path", "%2Fdocs%2Fa%20b%2F".to_string()),
            ]
        );
    }

    #[test]
    fn test_description_and_token_headers() {
        let headers = ChunkHeaders::Identity {
            name: EncodedString::from_plain("a"),
            size: 1,
            timestamp: 0,
            mimetype: EncodedString::default(),
            path: EncodedString::from_plain("/"),
            description: Some(EncodedString::from_plain("été")),
        };
        assert_eq!(
            headers.to_pairs().last(),
            Some(&("content-description", "%C3%A9t%C3%A9".to_string()))
        );
        assert_eq!(
            ChunkHeaders::Token("abc".into()).to_pairs(),
            vec![("content-token", "abc".to_string())]
        );
    }
}
