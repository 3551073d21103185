//! 演示数据投递工具
//!
//! 向订单 topic 发送随机生成的合法订单，也可追加一条畸形消息验证跳过逻辑。

use anyhow::Result;
use clap::Parser;
use order_service::generator::OrderGenerator;
use order_shared::{config::AppConfig, kafka::KafkaProducer, observability};
use tracing::info;

/// 订单演示数据投递
#[derive(Parser, Debug)]
#[command(name = "mock-produce")]
#[command(version, about = "向 Kafka 投递随机订单")]
struct Cli {
    /// 投递的订单数量
    #[arg(short, long, default_value = "10")]
    count: usize,

    /// 目标 topic，缺省使用配置中的 kafka.topic
    #[arg(long)]
    topic: Option<String>,

    /// 额外投递一条无法解码的消息
    #[arg(long)]
    with_poison: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("order-service").unwrap_or_default();
    observability::tracing::init(&config.observability)?;

    let topic = cli.topic.unwrap_or_else(|| config.kafka.topic.clone());
    let producer = KafkaProducer::new(&config.kafka)?;
    let generator = OrderGenerator::new()?;
    let mut rng = rand::rng();

    for _ in 0..cli.count {
        let order = generator.generate(&mut rng);
        let (partition, offset) = producer
            .send_json(&topic, &order.order_uid, &order)
            .await?;
        info!(order_uid = %order.order_uid, partition, offset, "订单已投递");
    }

    if cli.with_poison {
        producer
            .send(&topic, "poison", br#"{"order_uid":"poison","unexpected":true}"#)
            .await?;
        info!("畸形消息已投递");
    }

    info!(count = cli.count, topic = %topic, "投递完成");
    Ok(())
}
