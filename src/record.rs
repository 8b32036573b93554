use sea_orm::prelude::DateTime;
use sea_orm::ActiveValue::{NotSet, Set};

use crate::coords::GeoPoint;
use crate::entities::funeral_home;

/// A normalized CSV row, ready to be written as a `funeral_homes` row.
#[derive(Clone, Debug, PartialEq)]
pub struct FuneralHomeRecord {
    pub name: String,
    pub road_address: Option<String>,
    pub lot_address: Option<String>,
    pub phone: Option<String>,
    pub loc_code: Option<String>,
    pub loc_name: Option<String>,
    pub has_crematorium: bool,
    pub has_columbarium: bool,
    pub has_funeral: bool,
    /// Latitude and longitude always travel together.
    pub location: Option<GeoPoint>,
    pub is_active: bool,
    pub synced_at: DateTime,
}

impl FuneralHomeRecord {
    pub fn into_active_model(self, inserted_at: DateTime) -> funeral_home::ActiveModel {
        let geocoded_at = self.location.map(|_| self.synced_at);

        funeral_home::ActiveModel {
            id: NotSet,
            name: Set(self.name),
            road_address: Set(self.road_address),
            lot_address: Set(self.lot_address),
            phone: Set(self.phone),
            loc_code: Set(self.loc_code),
            loc_name: Set(self.loc_name),
            has_crematorium: Set(self.has_crematorium),
            has_columbarium: Set(self.has_columbarium),
            has_funeral: Set(self.has_funeral),
            latitude: Set(self.location.map(|p| p.latitude)),
            longitude: Set(self.location.map(|p| p.longitude)),
            geocoded_at: Set(geocoded_at),
            is_active: Set(self.is_active),
            verified_at: NotSet,
            synced_at: Set(Some(self.synced_at)),
            created_at: Set(inserted_at),
            updated_at: Set(inserted_at),
        }
    }
}
