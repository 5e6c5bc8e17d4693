//! Dashboard counts. Each metric is its own count query; results are not a snapshot.
use crate::error::{AdminError, AdminResult};
use crate::listing::decode_documents;
use crate::products::Product;
use crate::store::{DocumentStore, Filter, Query, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TotalUsers,
    TotalProducts,
    TotalOrders,
    TotalSellers,
    ActiveProducts,
    LowStockProducts,
    PendingApplications,
    ApprovedSellers,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::TotalUsers,
        Metric::TotalProducts,
        Metric::TotalOrders,
        Metric::TotalSellers,
        Metric::ActiveProducts,
        Metric::LowStockProducts,
        Metric::PendingApplications,
        Metric::ApprovedSellers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalUsers => "totalUsers",
            Metric::TotalProducts => "totalProducts",
            Metric::TotalOrders => "totalOrders",
            Metric::TotalSellers => "totalSellers",
            Metric::ActiveProducts => "activeProducts",
            Metric::LowStockProducts => "lowStockProducts",
            Metric::PendingApplications => "pendingApplications",
            Metric::ApprovedSellers => "approvedSellers",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_products: u64,
    pub total_orders: u64,
    pub total_sellers: u64,
    pub active_products: u64,
    pub low_stock_products: u64,
    pub pending_applications: u64,
    pub approved_sellers: u64,
}

impl DashboardStats {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::TotalUsers => self.total_users,
            Metric::TotalProducts => self.total_products,
            Metric::TotalOrders => self.total_orders,
            Metric::TotalSellers => self.total_sellers,
            Metric::ActiveProducts => self.active_products,
            Metric::LowStockProducts => self.low_stock_products,
            Metric::PendingApplications => self.pending_applications,
            Metric::ApprovedSellers => self.approved_sellers,
        }
    }

    pub fn metrics(&self) -> BTreeMap<&'static str, u64> {
        Metric::ALL.iter().map(|m| (m.name(), self.get(*m))).collect()
    }
}

/// Counts that succeeded plus the metrics whose query failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub counts: BTreeMap<&'static str, u64>,
    pub failed: Vec<&'static str>,
}

impl StatsReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Products at or under their minimum stock. No single predicate expresses a
/// per-document threshold, so this reads the products and counts locally.
async fn count_low_stock(store: &dyn DocumentStore) -> StoreResult<u64> {
    let docs = store.query(&Query::collection("products")).await?;
    Ok(decode_documents::<Product>(docs)
        .iter()
        .filter(|p| p.is_low_stock())
        .count() as u64)
}

/// Run every metric concurrently and keep whatever succeeded.
pub async fn collect_stats(store: &dyn DocumentStore) -> StatsReport {
    let sellers_filter = [Filter::contains("roles", "seller")];
    let active_filter = [Filter::eq("isActive", true)];
    let pending_filter = [Filter::eq("status", "pending")];
    let approved_filter = [Filter::eq("status", "approved")];

    let (users, products, orders, sellers, active, low_stock, pending, approved) = tokio::join!(
        store.count("users", &[]),
        store.count("products", &[]),
        store.count("orders", &[]),
        store.count("users", &sellers_filter),
        store.count("products", &active_filter),
        count_low_stock(store),
        store.count("sellers", &pending_filter),
        store.count("sellers", &approved_filter),
    );

    let results = [
        (Metric::TotalUsers, users),
        (Metric::TotalProducts, products),
        (Metric::TotalOrders, orders),
        (Metric::TotalSellers, sellers),
        (Metric::ActiveProducts, active),
        (Metric::LowStockProducts, low_stock),
        (Metric::PendingApplications, pending),
        (Metric::ApprovedSellers, approved),
    ];

    let mut report = StatsReport::default();
    for (metric, result) in results {
        match result {
            Ok(count) => {
                report.counts.insert(metric.name(), count);
            }
            Err(e) => {
                tracing::error!("Dashboard metric {} failed: {}", metric.name(), e);
                report.failed.push(metric.name());
            }
        }
    }
    report
}

/// All metrics or `StatsFailed`.
pub async fn compute_stats(store: &dyn DocumentStore) -> AdminResult<DashboardStats> {
    let report = collect_stats(store).await;
    if !report.is_complete() {
        return Err(AdminError::StatsFailed(format!(
            "metrics unavailable: {}",
            report.failed.join(", ")
        )));
    }

    let count = |m: Metric| report.counts.get(m.name()).copied().unwrap_or(0);
    Ok(DashboardStats {
        total_users: count(Metric::TotalUsers),
        total_products: count(Metric::TotalProducts),
        total_orders: count(Metric::TotalOrders),
        total_sellers: count(Metric::TotalSellers),
        active_products: count(Metric::ActiveProducts),
        low_stock_products: count(Metric::LowStockProducts),
        pending_applications: count(Metric::PendingApplications),
        approved_sellers: count(Metric::ApprovedSellers),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fields, InMemoryStore};
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.put("users", "u1", fields(json!({"roles": ["user", "seller"]}))).await.unwrap();
        store.put("users", "u2", fields(json!({"roles": ["user"]}))).await.unwrap();
        store
            .put("products", "p1", fields(json!({"isActive": true, "currentStock": 2})))
            .await
            .unwrap();
        store
            .put(
                "products",
                "p2",
                fields(json!({"isActive": false, "currentStock": 30, "minimumStock": 10})),
            )
            .await
            .unwrap();
        store.put("orders", "o1", fields(json!({}))).await.unwrap();
        store.put("sellers", "s1", fields(json!({"status": "pending"}))).await.unwrap();
        store.put("sellers", "s2", fields(json!({"status": "approved"}))).await.unwrap();
        store
    }

    #[tokio::test]
    async fn counts_every_metric() {
        let store = seeded().await;
        let stats = compute_stats(&store).await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_products, 2);
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.total_sellers, 1);
        assert_eq!(stats.active_products, 1);
        assert_eq!(stats.low_stock_products, 1);
        assert_eq!(stats.pending_applications, 1);
        assert_eq!(stats.approved_sellers, 1);
        assert_eq!(stats.metrics().len(), 8);
    }

    #[tokio::test]
    async fn one_failing_metric_fails_compute_but_not_collect() {
        let store = seeded().await;
        store.fail_collection("orders").await;

        let report = collect_stats(&store).await;
        assert_eq!(report.failed, vec!["totalOrders"]);
        assert_eq!(report.counts.get("totalUsers"), Some(&2));

        assert!(matches!(
            compute_stats(&store).await,
            Err(AdminError::StatsFailed(_))
        ));
    }
}
