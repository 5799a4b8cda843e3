//! TCP client for the router's binary management port.
//!
//! A [`TcpMgmtConnector`] dials the endpoint, logs in and hands back a
//! [`TcpSession`] owning the framed connection. Sentences are written one at a
//! time and the reply is read until `!done` (or `!fatal`).
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

use crate::{
    config::models::LoginMode,
    core::{
        codec::{CodecError, SentenceCodec},
        login::{challenge_answer, challenge_request, plain_login},
        sentence::{Reply, ReplyAssembler, Sentence},
    },
    ports::{
        mgmt_transport::{MgmtConnector, MgmtSession, TransportError, TransportResult},
        ship_directory::RouterEndpoint,
    },
};

/// Dials routers over plain TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpMgmtConnector {
    login: LoginMode,
}

impl TcpMgmtConnector {
    pub fn new(login: LoginMode) -> Self {
        Self { login }
    }
}

#[async_trait]
impl MgmtConnector for TcpMgmtConnector {
    async fn connect(
        &self,
        endpoint: &RouterEndpoint,
        dial_timeout: Duration,
    ) -> TransportResult<Box<dyn MgmtSession>> {
        let addr = endpoint.mgmt_addr();
        let stream = match timeout(dial_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::Unreachable(format!("{addr}: {e}"))),
            Err(_) => {
                return Err(TransportError::Unreachable(format!(
                    "{addr}: dial timed out after {dial_timeout:?}"
                )));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let mut session = TcpSession::new(stream, addr.clone());
        let login = session.login(self.login, &endpoint.user, &endpoint.password);
        match timeout(dial_timeout, login).await {
            Ok(Ok(())) => {
                tracing::debug!(addr = %addr, user = %endpoint.user, "management session ready");
                Ok(Box::new(session))
            }
            Ok(Err(e)) => {
                session.close().await;
                Err(e)
            }
            Err(_) => {
                session.close().await;
                Err(TransportError::Unreachable(format!(
                    "{addr}: login timed out after {dial_timeout:?}"
                )))
            }
        }
    }
}

/// One authenticated management connection
pub struct TcpSession {
    framed: Option<Framed<TcpStream, SentenceCodec>>,
    addr: String,
}

impl TcpSession {
    fn new(stream: TcpStream, addr: String) -> Self {
        Self {
            framed: Some(Framed::new(stream, SentenceCodec::new())),
            addr,
        }
    }

    async fn login(&mut self, mode: LoginMode, user: &str, password: &str) -> TransportResult<()> {
        let result = match mode {
            LoginMode::Challenge => {
                let reply = self.run(challenge_request()).await?;
                match reply.ret() {
                    Some(challenge) => {
                        let answer = challenge_answer(user, password, challenge)?;
                        self.run(answer).await.map(|_| ())
                    }
                    None => {
                        tracing::debug!(addr = %self.addr, "router issued no challenge; sending plain login");
                        self.run(plain_login(user, password)).await.map(|_| ())
                    }
                }
            }
            LoginMode::Plain => self.run(plain_login(user, password)).await.map(|_| ()),
        };

        result.map_err(|e| match e {
            TransportError::Trap { message, .. } => TransportError::AuthRejected(message),
            TransportError::Fatal(reason) => TransportError::Unreachable(reason),
            other => other,
        })
    }

    async fn exchange(
        framed: &mut Framed<TcpStream, SentenceCodec>,
        addr: &str,
        sentence: Sentence,
    ) -> TransportResult<Reply> {
        framed
            .send(sentence)
            .await
            .map_err(|e| codec_error(addr, e))?;

        let mut assembler = ReplyAssembler::default();
        loop {
            match framed.next().await {
                Some(Ok(sentence)) => {
                    if let Some(result) = assembler.push(sentence) {
                        return result;
                    }
                }
                Some(Err(e)) => return Err(codec_error(addr, e)),
                None => {
                    return Err(TransportError::Unreachable(format!(
                        "{addr}: connection closed by router"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl MgmtSession for TcpSession {
    async fn run(&mut self, sentence: Sentence) -> TransportResult<Reply> {
        let Some(framed) = self.framed.as_mut() else {
            return Err(TransportError::Unreachable(format!(
                "{}: session already closed",
                self.addr
            )));
        };
        tracing::trace!(command = ?sentence.head(), "sending sentence");

        let result = Self::exchange(framed, &self.addr, sentence).await;
        if matches!(
            result,
            Err(TransportError::Fatal(_) | TransportError::Unreachable(_))
        ) {
            // The router has hung up; nothing more can be sent
            self.framed = None;
        }
        result
    }

    async fn close(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            if let Err(e) = framed.close().await {
                tracing::debug!(addr = %self.addr, error = %e, "error closing management session");
            }
        }
    }
}

fn codec_error(addr: &str, err: CodecError) -> TransportError {
    match err {
        CodecError::Io(e) => TransportError::Unreachable(format!("{addr}: {e}")),
        other => TransportError::Protocol(other.to_string()),
    }
}
