use std::mem;

use indicatif::ProgressBar;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait};
use tracing::debug;

use crate::entities::funeral_home;
use crate::entities::funeral_home::ActiveModel as FuneralHomeModel;

/// Buffers rows and writes them as multi-row INSERT statements of at most
/// `batch_size` rows, all on the same connection or transaction.
pub struct BatchInsert<'c, C: ConnectionTrait> {
    db: &'c C,
    batch: Vec<FuneralHomeModel>,
    batch_size: usize,
    inserted: usize,
    progress: ProgressBar,
}

impl<'c, C> BatchInsert<'c, C>
where
    C: ConnectionTrait,
{
    pub fn new(db: &'c C, batch_size: usize, progress: ProgressBar) -> BatchInsert<'c, C> {
        let batch_size = batch_size.max(1);

        BatchInsert {
            db,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            inserted: 0,
            progress,
        }
    }

    pub async fn insert(&mut self, value: FuneralHomeModel) -> Result<(), DbErr> {
        self.batch.push(value);

        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    pub async fn flush(&mut self) -> Result<usize, DbErr> {
        if self.batch.is_empty() {
            return Ok(0);
        }

        let batch = mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let count = batch.len();

        funeral_home::Entity::insert_many(batch)
            .exec_without_returning(self.db)
            .await?;

        self.inserted += count;
        self.progress.inc(count as u64);
        debug!(count, total = self.inserted, "flushed insert batch");

        Ok(count)
    }

    /// Writes whatever is still buffered and returns the number of rows inserted.
    pub async fn finish(mut self) -> Result<usize, DbErr> {
        self.flush().await?;
        self.progress.finish_and_clear();

        Ok(self.inserted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbBackend, PaginatorTrait, Schema};
    use sea_orm::ActiveValue::{NotSet, Set};

    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();

        let create = Schema::new(DbBackend::Sqlite).create_table_from_entity(funeral_home::Entity);
        db.execute(db.get_database_backend().build(&create))
            .await
            .unwrap();

        db
    }

    fn model(name: &str) -> FuneralHomeModel {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        FuneralHomeModel {
            id: NotSet,
            name: Set(name.to_string()),
            road_address: Set(None),
            lot_address: Set(None),
            phone: Set(None),
            loc_code: Set(None),
            loc_name: Set(None),
            has_crematorium: Set(false),
            has_columbarium: Set(false),
            has_funeral: Set(true),
            latitude: Set(None),
            longitude: Set(None),
            geocoded_at: Set(None),
            is_active: Set(true),
            verified_at: NotSet,
            synced_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let db = DatabaseConnection::Disconnected;

        let batcher = BatchInsert::new(&db, 0, ProgressBar::hidden());

        assert_eq!(batcher.batch_size, 1);
    }

    #[tokio::test]
    async fn flushes_full_batches_and_the_remainder() {
        let db = memory_db().await;
        let mut batcher = BatchInsert::new(&db, 2, ProgressBar::hidden());

        for i in 0..5 {
            batcher.insert(model(&format!("장례식장 {i}"))).await.unwrap();
        }
        // two full batches went out, one row is still buffered
        assert_eq!(funeral_home::Entity::find().count(&db).await.unwrap(), 4);
        assert_eq!(batcher.batch.len(), 1);

        assert_eq!(batcher.finish().await.unwrap(), 5);
        assert_eq!(funeral_home::Entity::find().count(&db).await.unwrap(), 5);
    }
}
