use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TierBreakdown {
    pub tier: String,
    pub users: u64,
    #[schema(value_type = String)]
    pub monthly_price: Decimal,
    #[schema(value_type = String)]
    pub revenue: Decimal,
    /// Share of all users, as a percentage
    pub percentage: f64,
}

/// Subscription revenue derived from the tier of every profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct RevenueReport {
    pub total_users: u64,
    pub paying_users: u64,
    /// Monthly recurring revenue
    #[schema(value_type = String)]
    pub mrr: Decimal,
    /// Annual recurring revenue (12 x MRR)
    #[schema(value_type = String)]
    pub arr: Decimal,
    /// Average revenue per user
    #[schema(value_type = String)]
    pub arpu: Decimal,
    pub tiers: Vec<TierBreakdown>,
}
