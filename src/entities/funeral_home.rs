use sea_orm::entity::prelude::*;

/// One facility row of the public pet funeral-home dataset.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "funeral_homes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub road_address: Option<String>,
    pub lot_address: Option<String>,
    pub phone: Option<String>,
    pub loc_code: Option<String>,
    pub loc_name: Option<String>,
    pub has_crematorium: bool,
    pub has_columbarium: bool,
    pub has_funeral: bool,
    #[sea_orm(column_type = "Decimal(Some((10, 7)))", nullable)]
    pub latitude: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((10, 7)))", nullable)]
    pub longitude: Option<Decimal>,
    pub geocoded_at: Option<DateTime>,
    pub is_active: bool,
    pub verified_at: Option<DateTime>,
    pub synced_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
