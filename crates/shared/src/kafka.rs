//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为与业务无关的消息源 / 生产者抽象，
//! 统一消息所有权转换、错误映射和手动提交语义。
//!
//! 消费端关闭自动提交：只有业务确认处理完成后才提交位点，
//! 进程在提交前崩溃时消息会被重新投递（至少一次）。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::InfraError;

/// seek 操作的最长等待时间
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递，并在提交/回退时携带位点信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 日志中使用的消息键，缺失时返回 "-"
    pub fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or("-")
    }
}

// ---------------------------------------------------------------------------
// MessageSource
// ---------------------------------------------------------------------------

/// 消息源抽象
///
/// 与具体 broker 无关：只要求分区内有序、至少一次投递。
/// 消费循环依赖此 trait 而非 rdkafka，测试中可用脚本化的内存实现替换。
#[async_trait]
pub trait MessageSource: Send {
    /// 拉取下一条消息，阻塞直到有消息或出错
    async fn fetch(&mut self) -> Result<ConsumerMessage, InfraError>;

    /// 确认消息已处理完毕，提交其位点
    async fn commit(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError>;

    /// 将分区位置回退到该消息，使下一次 fetch 重新投递它
    async fn rewind(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError>;
}

// ---------------------------------------------------------------------------
// KafkaMessageSource
// ---------------------------------------------------------------------------

/// 基于 `StreamConsumer` 的 Kafka 消息源
///
/// 关闭自动提交，提交与回退均由消费循环显式驱动。
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    /// 创建消费者并订阅配置中的 topic
    pub fn new(config: &KafkaConfig) -> Result<Self, InfraError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("fetch.min.bytes", config.fetch_min_bytes.to_string())
            .set("fetch.max.bytes", config.fetch_max_bytes.to_string())
            .create()
            .map_err(|e| InfraError::Kafka(format!("创建消费者失败: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| InfraError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            topic = %config.topic,
            "Kafka 消费者已初始化（手动提交）"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn fetch(&mut self) -> Result<ConsumerMessage, InfraError> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| InfraError::Kafka(format!("接收消息失败: {e}")))?;

        let msg = ConsumerMessage::from_borrowed(&borrowed);
        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "收到 Kafka 消息"
        );
        Ok(msg)
    }

    async fn commit(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError> {
        // Kafka 约定提交的是"下一条要读取的位点"
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| InfraError::Kafka(format!("构造提交位点失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| InfraError::Kafka(format!("提交位点失败: {e}")))
    }

    async fn rewind(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError> {
        self.consumer
            .seek(
                &msg.topic,
                msg.partition,
                Offset::Offset(msg.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| InfraError::Kafka(format!("回退位点失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供 JSON 发送方法，目前只用于本地演示数据投递。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    pub fn new(config: &KafkaConfig) -> Result<Self, InfraError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| InfraError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), InfraError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| InfraError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), InfraError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| InfraError::Kafka(format!("序列化失败: {e}")))?;

        self.send(topic, key, &payload).await
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8]) -> ConsumerMessage {
        ConsumerMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset: 42,
            key: None,
            payload: payload.to_vec(),
            timestamp: Some(1_700_000_000_000),
            headers: HashMap::new(),
        }
    }

    #[test]
    fn test_consumer_message_creation() {
        let msg = ConsumerMessage {
            key: Some("order-1".to_string()),
            headers: HashMap::from([("trace-id".to_string(), "abc-123".to_string())]),
            ..message(b"hello")
        };

        assert_eq!(msg.topic, "orders");
        assert_eq!(msg.partition, 0);
        assert_eq!(msg.offset, 42);
        assert_eq!(msg.key_str(), "order-1");
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.headers.get("trace-id").unwrap(), "abc-123");
    }

    #[test]
    fn test_key_str_missing() {
        assert_eq!(message(b"").key_str(), "-");
    }
}
