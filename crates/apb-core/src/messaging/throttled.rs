use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        self.reserve_at(Instant::now())
    }

    fn reserve_at(&mut self, now: Instant) -> Duration {
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }

    fn is_free_at(&self, now: Instant) -> bool {
        now >= self.next
    }
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Progress edits for long batches can otherwise trip Telegram's 429s.
/// Messages and edits wait for their turn; typing indicators are dropped
/// when the chat is busy, since the next tick repeats them anyway.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Reserve a slot only if one is free right now.
    async fn try_throttle_chat(&self, chat_id: i64) -> bool {
        let lim = self.limiter_for_chat(chat_id).await;
        let mut global = self.global.lock().await;
        let mut chat = lim.lock().await;
        let now = Instant::now();
        if !global.is_free_at(now) || !chat.is_free_at(now) {
            return false;
        }
        global.reserve_at(now);
        chat.reserve_at(now);
        true
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_html(msg, html).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.delete_message(msg).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        if !self.try_throttle_chat(chat_id.0).await {
            tracing::trace!(chat_id = chat_id.0, "chat busy, skipping chat action");
            return Ok(());
        }
        self.inner.send_chat_action(chat_id, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_limiter_spaces_reservations() {
        let start = Instant::now();
        let mut lim = IntervalLimiter {
            interval: Duration::from_millis(100),
            next: start,
        };

        assert_eq!(lim.reserve_at(start), Duration::ZERO);
        assert_eq!(lim.reserve_at(start), Duration::from_millis(100));
        assert_eq!(lim.reserve_at(start), Duration::from_millis(200));

        // Once the window has passed, no wait is needed.
        let later = start + Duration::from_secs(1);
        assert_eq!(lim.reserve_at(later), Duration::ZERO);
    }

    #[derive(Default)]
    struct CountingMessenger {
        sends: std::sync::Mutex<usize>,
        actions: std::sync::Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for CountingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_edit: true,
            }
        }

        async fn send_html(&self, chat_id: ChatId, _html: &str) -> Result<MessageRef> {
            *self.sends.lock().unwrap() += 1;
            Ok(MessageRef {
                chat_id,
                message_id: crate::domain::MessageId(1),
            })
        }

        async fn edit_html(&self, _msg: MessageRef, _html: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            *self.actions.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn typing_is_dropped_while_the_chat_is_busy() {
        let inner = Arc::new(CountingMessenger::default());
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::ZERO,
                per_chat_min_interval: Duration::from_secs(60),
            },
        );

        throttled.send_html(ChatId(1), "report").await.unwrap();
        throttled
            .send_chat_action(ChatId(1), ChatAction::Typing)
            .await
            .unwrap();
        // Another chat is unaffected.
        throttled
            .send_chat_action(ChatId(2), ChatAction::Typing)
            .await
            .unwrap();

        assert_eq!(*inner.sends.lock().unwrap(), 1);
        assert_eq!(*inner.actions.lock().unwrap(), 1);
    }
}
