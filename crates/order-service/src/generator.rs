//! 演示订单生成
//!
//! 以内置样例消息为模板，随机化订单号、收件人、商品和金额，生成可通过校验的订单。

use chrono::{Duration, Utc};
use fake::Fake;
use fake::faker::address::en::{CityName, StateName, StreetName, ZipCode};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use uuid::Uuid;

use crate::models::{Item, Order};

const TEMPLATE: &str = include_str!("../tests/fixtures/order.json");

const BRANDS: &[&str] = &["Vivienne Sabo", "Nivea", "Maybelline", "L'Oreal", "Garnier"];
const NAMES: &[&str] = &["Mascaras", "Lipstick", "Shampoo", "Face Cream", "Perfume"];

/// 订单生成器，解析一次模板后重复使用
pub struct OrderGenerator {
    template: Order,
}

impl OrderGenerator {
    pub fn new() -> Result<Self, serde_json::Error> {
        Ok(Self {
            template: serde_json::from_str(TEMPLATE)?,
        })
    }

    /// 生成一个随机订单
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Order {
        let uid = Uuid::new_v4().simple().to_string();
        let track_number = format!("WBIL{}", &uid[..10].to_uppercase());

        let item_count = rng.random_range(1..=4);
        let items: Vec<Item> = (0..item_count)
            .map(|_| {
                let price = rng.random_range(100..5_000_i64);
                let sale = rng.random_range(0..=50_i32);
                Item {
                    chrt_id: rng.random_range(1_000_000..9_999_999),
                    track_number: track_number.clone(),
                    price,
                    rid: Uuid::new_v4().simple().to_string(),
                    name: NAMES[rng.random_range(0..NAMES.len())].to_string(),
                    sale,
                    size: rng.random_range(0..5).to_string(),
                    total_price: price * i64::from(100 - sale) / 100,
                    nm_id: rng.random_range(1_000_000..9_999_999),
                    brand: BRANDS[rng.random_range(0..BRANDS.len())].to_string(),
                    status: 202,
                }
            })
            .collect();

        let goods_total: i64 = items.iter().map(|i| i.total_price).sum();
        let delivery_cost = rng.random_range(0..2_000_i64);
        let created = Utc::now() - Duration::seconds(rng.random_range(0..86_400));

        let mut order = self.template.clone();
        order.delivery.name = Name().fake_with_rng(rng);
        order.delivery.phone = PhoneNumber().fake_with_rng(rng);
        order.delivery.zip = ZipCode().fake_with_rng(rng);
        order.delivery.city = CityName().fake_with_rng(rng);
        order.delivery.address = StreetName().fake_with_rng(rng);
        order.delivery.region = StateName().fake_with_rng(rng);
        order.delivery.email = SafeEmail().fake_with_rng(rng);
        order.order_uid = uid.clone();
        order.track_number = track_number;
        order.customer_id = format!("customer-{}", rng.random_range(1..1_000));
        order.items = items;
        order.payment.transaction = uid;
        order.payment.goods_total = goods_total;
        order.payment.delivery_cost = delivery_cost;
        order.payment.amount = goods_total + delivery_cost;
        order.payment.payment_dt = created.timestamp();
        order.date_created = created;
        order
    }
}
