use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, Stream, StreamExt};

/// 单个响应的聚合缓冲，超过上限后放弃
#[derive(Debug)]
pub struct AggregationBuffer {
    bytes: BytesMut,
    max_bytes: usize,
}

impl AggregationBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            bytes: BytesMut::new(),
            max_bytes,
        }
    }

    /// 追加一个分片；累计大小超过上限返回 false，缓冲不变
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.bytes.len() + chunk.len() > self.max_bytes {
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.bytes.freeze()
    }
}

type OnComplete = Box<dyn FnOnce(Bytes) + Send>;

/// 响应 body 的旁路：每个分片原样向下游转发，同时写入聚合缓冲。
///
/// 只有 body 完整且没有超过上限时才会调用 `on_complete`。完整指流正常结束，
/// 或者已经收满 `expect_len` 声明的长度。
/// 流出错或者在完整之前被丢弃（客户端断开）时什么都不做。
pub struct BodyTap<E: 'static> {
    inner: BoxStream<'static, Result<Bytes, E>>,
    buffer: Option<AggregationBuffer>,
    on_complete: Option<OnComplete>,
    expected_len: Option<u64>,
}

impl<E: 'static> BodyTap<E> {
    pub fn new<S>(
        stream: S,
        max_bytes: usize,
        on_complete: impl FnOnce(Bytes) + Send + 'static,
    ) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            buffer: Some(AggregationBuffer::new(max_bytes)),
            on_complete: Some(Box::new(on_complete)),
            expected_len: None,
        }
    }

    /// 声明 body 长度（通常来自 Content-Length）。
    ///
    /// hyper 按 Content-Length 写满后直接丢弃 body，不会再轮询到流结束，
    /// 所以收满声明长度就算完成。长度为 0 时立即完成。
    pub fn expect_len(mut self, len: Option<u64>) -> Self {
        self.expected_len = len;
        self.complete_if_full();
        self
    }

    /// 分段写出的 body（每段是一个流）按顺序拼接后走同一条旁路。
    /// axum 的响应 body 只有一条写出路径，网关本身用 `new`；
    /// 这个入口给自己产生分段流的调用方。
    pub fn segmented<S, T>(
        segments: S,
        max_bytes: usize,
        on_complete: impl FnOnce(Bytes) + Send + 'static,
    ) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self::new(segments.flatten(), max_bytes, on_complete)
    }

    fn abandon(&mut self) {
        self.buffer = None;
        self.on_complete = None;
    }

    fn complete(&mut self) {
        if let (Some(buffer), Some(on_complete)) = (self.buffer.take(), self.on_complete.take()) {
            on_complete(buffer.freeze());
        }
    }

    fn complete_if_full(&mut self) {
        let full = match (&self.buffer, self.expected_len) {
            (Some(buffer), Some(len)) => buffer.len() as u64 >= len,
            _ => false,
        };
        if full {
            self.complete();
        }
    }
}

impl<E: 'static> Stream for BodyTap<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(buffer) = this.buffer.as_mut() {
                    if !buffer.push(&chunk) {
                        tracing::debug!(
                            "Response exceeds {} bytes, not caching",
                            buffer.max_bytes
                        );
                        this.abandon();
                    }
                }
                this.complete_if_full();
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.abandon();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                // 比声明长度短的 body 不完整
                if this.expected_len.is_some() {
                    this.abandon();
                }
                this.complete();
                Poll::Ready(None)
            }
        }
    }
}
