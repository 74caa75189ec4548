//! `SeaORM` Entity for orders table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_no: String,
    pub site_id: String,
    pub platform: String,
    pub channel: Option<String>,
    pub status: String,
    pub settlement_status: String,
    pub settlement_date: Option<Date>,
    pub placed_at: DateTimeWithTimeZone,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub cost_of_goods: Decimal,
    pub logistics_cost: Decimal,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub remark: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
