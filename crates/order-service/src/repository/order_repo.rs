//! 订单仓储
//!
//! 订单聚合拆分为四张表：orders、deliveries、payments 与 items。
//! 前三张表以 order_uid 一一对应，items 以自增 id 记录插入顺序。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use super::traits::OrderRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::models::{Delivery, Item, Order, Payment};

/// orders 与 deliveries、payments 联表查询的行
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    #[sqlx(flatten)]
    delivery: Delivery,
    #[sqlx(flatten)]
    payment: Payment,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: self.delivery,
            payment: self.payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shard_key: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

/// PostgreSQL 订单仓储
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 写入订单聚合
    ///
    /// 在单个事务内完成：
    /// - upsert 订单头
    /// - upsert 配送信息
    /// - upsert 支付信息
    /// - 删除旧商品明细并按顺序插入新明细
    ///
    /// 事务在提交前被 drop 时自动回滚，不会留下部分写入的聚合。
    pub async fn upsert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature, customer_id,
                delivery_service, shardkey, sm_id, date_created, oof_shard, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard,
                updated_at = NOW()
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        let d = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                zip = EXCLUDED.zip,
                city = EXCLUDED.city,
                address = EXCLUDED.address,
                region = EXCLUDED.region,
                email = EXCLUDED.email
            "#,
        )
        .bind(&order.order_uid)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .execute(&mut *tx)
        .await?;

        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (
                order_uid, transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction = EXCLUDED.transaction,
                request_id = EXCLUDED.request_id,
                currency = EXCLUDED.currency,
                provider = EXCLUDED.provider,
                amount = EXCLUDED.amount,
                payment_dt = EXCLUDED.payment_dt,
                bank = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total = EXCLUDED.goods_total,
                custom_fee = EXCLUDED.custom_fee
            "#,
        )
        .bind(&order.order_uid)
        .bind(&p.transaction)
        .bind(&p.request_id)
        .bind(&p.currency)
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .execute(&mut *tx)
        .await?;

        // 明细没有稳定标识，整体替换
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, chrt_id, track_number, price, rid, name, sale, size,
                    total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(order_uid = %order.order_uid, items = order.item_count(), "订单已写入");
        Ok(())
    }

    /// 读取订单聚合
    pub async fn get_by_id(&self, order_uid: &str) -> Result<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
                o.oof_shard,
                d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                p.transaction, p.request_id, p.currency, p.provider, p.amount,
                p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
            FROM orders o
            JOIN deliveries d ON d.order_uid = o.order_uid
            JOIN payments p ON p.order_uid = o.order_uid
            WHERE o.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| OrderError::not_found(order_uid))?;

        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(row.into_order(items))
    }

    /// 最近创建的订单
    pub async fn list_latest(&self, limit: i64) -> Result<Vec<Order>> {
        if limit <= 0 {
            return Ok(vec![]);
        }

        let uids = self.list_order_uids(limit, 0).await?;

        let mut orders = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_by_id(&uid).await {
                Ok(order) => orders.push(order),
                Err(e) => warn!(order_uid = %uid, error = %e, "读取订单失败，已跳过"),
            }
        }
        Ok(orders)
    }

    /// 分页列出订单号
    ///
    /// 与 `count_orders` 分别查询，并发写入时两者可能不一致。
    pub async fn list_order_uids(&self, limit: i64, offset: i64) -> Result<Vec<String>> {
        let uids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT order_uid
            FROM orders
            ORDER BY date_created DESC, order_uid ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(uids)
    }

    pub async fn count_orders(&self) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[async_trait]
impl OrderRepositoryTrait for PgOrderRepository {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn upsert(&self, order: &Order) -> Result<()> {
        self.upsert(order).await
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, order_uid: &str) -> Result<Order> {
        self.get_by_id(order_uid).await
    }

    #[instrument(skip(self))]
    async fn list_latest(&self, limit: i64) -> Result<Vec<Order>> {
        self.list_latest(limit).await
    }

    async fn list_order_uids(&self, limit: i64, offset: i64) -> Result<Vec<String>> {
        self.list_order_uids(limit, offset).await
    }

    async fn count_orders(&self) -> Result<i64> {
        self.count_orders().await
    }
}
