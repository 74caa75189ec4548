//! `SeaORM` Entity for site_metrics_daily table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "site_metrics_daily")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub site: String,
    pub platform: String,
    pub channel: String,
    pub stat_date: Date,
    pub impressions: i64,
    pub visitors: i64,
    pub add_to_cart: i64,
    pub orders: i64,
    pub payments: i64,
    pub revenue: Decimal,
    pub currency: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
