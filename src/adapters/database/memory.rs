use crate::{
    domain::{Member, NewProduct, PointRecord, Product, ProductType},
    ports::database::{DatabasePort, Error, Transaction},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// In-memory relational store
///
/// Every row carries a version number, drawn from a store-wide counter on insert and on each
/// committed write, so a version is never reused even if a row is deleted and inserted again.
/// Transactions remember the version of every row they read and refuse to commit if any of
/// them moved.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    members: HashMap<Uuid, Row<Member>>,
    /// Kept in creation order
    products: Vec<Row<Product>>,
    point_records: Vec<PointRecord>,
    /// Last version handed out
    clock: u64,
}

impl Tables {
    fn next_version(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn product(&self, product_id: Uuid) -> Option<&Row<Product>> {
        self.products
            .iter()
            .find(|row| row.value.product_id == product_id)
    }

    fn product_mut(&mut self, product_id: Uuid) -> Option<&mut Row<Product>> {
        self.products
            .iter_mut()
            .find(|row| row.value.product_id == product_id)
    }
}

#[derive(Clone, Debug)]
struct Row<T> {
    value: T,
    version: u64,
}


#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn insert_member(&self, member: Member) -> Result<Member, Error> {
        let mut tables = self.tables.lock()?;
        if tables.members.contains_key(&member.member_id) {
            return Err(Error::MemberAlreadyExists(member.member_id));
        }
        let version = tables.next_version();
        tables.members.insert(
            member.member_id,
            Row {
                value: member.clone(),
                version,
            },
        );

        Ok(member)
    }

    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error> {
        self.tables
            .lock()?
            .members
            .get(&member_id)
            .map(|row| row.value.clone())
            .ok_or(Error::MemberDoesNotExist(member_id))
    }

    async fn delete_member(&self, member_id: Uuid) -> Result<(), Error> {
        let mut tables = self.tables.lock()?;
        tables
            .members
            .remove(&member_id)
            .ok_or(Error::MemberDoesNotExist(member_id))?;
        tables
            .point_records
            .retain(|record| record.member_id != member_id);

        Ok(())
    }

    async fn get_point_records(&self, member_id: Uuid) -> Result<Vec<PointRecord>, Error> {
        let records = self
            .tables
            .lock()?
            .point_records
            .iter()
            .filter(|record| record.member_id == member_id)
            .cloned()
            .collect();

        Ok(records)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, Error> {
        let mut tables = self.tables.lock()?;
        if tables.products.iter().any(|row| row.value.name == product.name) {
            return Err(Error::DuplicateProductName(product.name));
        }
        let product = Product::new(Uuid::new_v4(), product);
        let version = tables.next_version();
        tables.products.push(Row {
            value: product.clone(),
            version,
        });

        Ok(product)
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Product, Error> {
        self.tables
            .lock()?
            .product(product_id)
            .map(|row| row.value.clone())
            .ok_or(Error::ProductDoesNotExist(product_id))
    }

    async fn list_products(&self) -> Result<Vec<Product>, Error> {
        let products = self
            .tables
            .lock()?
            .products
            .iter()
            .map(|row| row.value.clone())
            .collect();

        Ok(products)
    }

    async fn list_products_by_type(
        &self,
        product_type: ProductType,
    ) -> Result<Vec<Product>, Error> {
        let products = self
            .tables
            .lock()?
            .products
            .iter()
            .filter(|row| row.value.product_type == product_type)
            .map(|row| row.value.clone())
            .collect();

        Ok(products)
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>, Error> {
        let product = self
            .tables
            .lock()?
            .products
            .iter()
            .find(|row| row.value.name == name)
            .map(|row| row.value.clone());

        Ok(product)
    }

    async fn delete_product(&self, product_id: Uuid) -> Result<(), Error> {
        let mut tables = self.tables.lock()?;
        let len = tables.products.len();
        tables
            .products
            .retain(|row| row.value.product_id != product_id);
        if tables.products.len() == len {
            return Err(Error::ProductDoesNotExist(product_id));
        }

        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, Error> {
        Ok(Box::new(MemoryTransaction::new(self.tables.clone())))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Member(Uuid),
    Product(Uuid),
}

/// Optimistic transaction over a [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    /// Version of each row at the time it was first read
    read_versions: HashMap<RowKey, u64>,
    members: HashMap<Uuid, Member>,
    products: HashMap<Uuid, Product>,
    point_records: Vec<PointRecord>,
    finished: bool,
}

impl MemoryTransaction {
    fn new(tables: Arc<Mutex<Tables>>) -> Self {
        Self {
            tables,
            read_versions: HashMap::new(),
            members: HashMap::new(),
            products: HashMap::new(),
            point_records: Vec::new(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::TransactionFinished);
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.members.clear();
        self.products.clear();
        self.point_records.clear();
        self.finished = true;
    }
}

#[async_trait::async_trait]
impl Transaction for MemoryTransaction {
    async fn member(&mut self, member_id: Uuid) -> Result<Member, Error> {
        self.ensure_open()?;
        // Read-your-writes
        if let Some(member) = self.members.get(&member_id) {
            return Ok(member.clone());
        }

        let row = self
            .tables
            .lock()?
            .members
            .get(&member_id)
            .cloned()
            .ok_or(Error::MemberDoesNotExist(member_id))?;
        self.read_versions
            .entry(RowKey::Member(member_id))
            .or_insert(row.version);

        Ok(row.value)
    }

    async fn product(&mut self, product_id: Uuid) -> Result<Product, Error> {
        self.ensure_open()?;
        if let Some(product) = self.products.get(&product_id) {
            return Ok(product.clone());
        }

        let row = self
            .tables
            .lock()?
            .product(product_id)
            .cloned()
            .ok_or(Error::ProductDoesNotExist(product_id))?;
        self.read_versions
            .entry(RowKey::Product(product_id))
            .or_insert(row.version);

        Ok(row.value)
    }

    fn put_member(&mut self, member: Member) {
        self.members.insert(member.member_id, member);
    }

    fn put_product(&mut self, product: Product) {
        self.products.insert(product.product_id, product);
    }

    fn append_point_record(&mut self, record: PointRecord) {
        self.point_records.push(record);
    }

    async fn commit(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let mut tables = self.tables.lock()?;

        // Validate everything before touching anything
        for (key, version) in &self.read_versions {
            let current = match key {
                RowKey::Member(member_id) => tables.members.get(member_id).map(|row| row.version),
                RowKey::Product(product_id) => tables.product(*product_id).map(|row| row.version),
            };
            if current != Some(*version) {
                return Err(Error::Conflict);
            }
        }
        for member_id in self.members.keys() {
            if !tables.members.contains_key(member_id) {
                return Err(Error::MemberDoesNotExist(*member_id));
            }
        }
        for product_id in self.products.keys() {
            if tables.product(*product_id).is_none() {
                return Err(Error::ProductDoesNotExist(*product_id));
            }
        }

        for (member_id, member) in self.members.drain() {
            let version = tables.next_version();
            if let Some(row) = tables.members.get_mut(&member_id) {
                row.value = member;
                row.version = version;
            }
        }
        for (product_id, product) in self.products.drain() {
            let version = tables.next_version();
            if let Some(row) = tables.product_mut(product_id) {
                row.value = product;
                row.version = version;
            }
        }
        tables.point_records.append(&mut self.point_records);
        drop(tables);

        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.discard();
        Ok(())
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

/// We need to create a custom `From` implementation here for an error that's specific to this
/// adapter.
impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    #[fixture]
    fn new_product() -> NewProduct {
        NewProduct {
            name: "Cola".to_string(),
            price: 30,
            quantity: 5,
            product_type: ProductType::Drink,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_retrieve(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let member = Member::new(Uuid::new_v4(), "alice", None, 100);

        let res = database.insert_member(member.clone()).await;
        assert_that!(res).is_ok();
        let res = database.get_member(member.member_id).await;
        assert_that!(res).is_ok().is_equal_to(member);

        let product = database.insert_product(new_product).await.unwrap();
        let res = database.get_product(product.product_id).await;
        assert_that!(res).is_ok().is_equal_to(product);
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let database = MemoryDatabase::default();
        let id = Uuid::new_v4();

        assert_that!(database.get_member(id).await)
            .is_err()
            .matches(|err| matches!(err, Error::MemberDoesNotExist(_)));
        assert_that!(database.delete_product(id).await)
            .is_err()
            .matches(|err| matches!(err, Error::ProductDoesNotExist(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_filters(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let cola = database.insert_product(new_product.clone()).await.unwrap();
        let chips = database
            .insert_product(NewProduct {
                name: "Chips".to_string(),
                product_type: ProductType::Snack,
                ..new_product
            })
            .await
            .unwrap();

        let all = database.list_products().await.unwrap();
        assert_that!(all).is_equal_to(vec![cola.clone(), chips.clone()]);

        let snacks = database
            .list_products_by_type(ProductType::Snack)
            .await
            .unwrap();
        assert_that!(snacks).is_equal_to(vec![chips]);

        let found = database.find_product_by_name("Cola").await.unwrap();
        assert_that!(found).is_equal_to(Some(cola));
        let found = database.find_product_by_name("Water").await.unwrap();
        assert_that!(found).is_none();
    }

    #[rstest]
    #[tokio::test]
    async fn test_commit_applies_all_writes(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let member = database
            .insert_member(Member::new(Uuid::new_v4(), "alice", None, 100))
            .await
            .unwrap();
        let product = database.insert_product(new_product).await.unwrap();

        let mut tx = database.begin().await.unwrap();
        let m = tx.member(member.member_id).await.unwrap();
        let p = tx.product(product.product_id).await.unwrap();
        tx.put_member(m.debit(30).unwrap());
        tx.put_product(p.take(1).unwrap());
        tx.append_point_record(PointRecord::new(member.member_id, -30, "test"));

        // Nothing is visible before commit
        assert_that!(database.get_member(member.member_id).await.unwrap().points())
            .is_equal_to(100);

        assert_that!(tx.commit().await).is_ok();
        assert_that!(database.get_member(member.member_id).await.unwrap().points())
            .is_equal_to(70);
        assert_that!(database.get_product(product.product_id).await.unwrap().quantity())
            .is_equal_to(4);
        assert_that!(database.get_point_records(member.member_id).await.unwrap()).has_length(1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_conflicting_commit_applies_nothing(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let member = database
            .insert_member(Member::new(Uuid::new_v4(), "alice", None, 100))
            .await
            .unwrap();
        let product = database.insert_product(new_product).await.unwrap();

        let mut first = database.begin().await.unwrap();
        let mut second = database.begin().await.unwrap();
        for tx in [&mut first, &mut second] {
            let m = tx.member(member.member_id).await.unwrap();
            let p = tx.product(product.product_id).await.unwrap();
            tx.put_member(m.debit(30).unwrap());
            tx.put_product(p.take(5).unwrap());
        }

        assert_that!(first.commit().await).is_ok();
        assert_that!(second.commit().await)
            .is_err()
            .matches(|err| matches!(err, Error::Conflict));

        assert_that!(database.get_member(member.member_id).await.unwrap().points())
            .is_equal_to(70);
        assert_that!(database.get_product(product.product_id).await.unwrap().quantity())
            .is_equal_to(0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_rollback_discards(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let product = database.insert_product(new_product).await.unwrap();

        let mut tx = database.begin().await.unwrap();
        let p = tx.product(product.product_id).await.unwrap();
        tx.put_product(p.take(5).unwrap());
        // Read-your-writes inside the transaction
        assert_that!(tx.product(product.product_id).await.unwrap().quantity()).is_equal_to(0);
        assert_that!(tx.rollback().await).is_ok();
        assert_that!(tx.commit().await)
            .is_err()
            .matches(|err| matches!(err, Error::TransactionFinished));

        assert_that!(database.get_product(product.product_id).await.unwrap().quantity())
            .is_equal_to(5);
    }

    #[tokio::test]
    async fn test_delete_member_removes_history() {
        let database = MemoryDatabase::default();
        let member = database
            .insert_member(Member::new(Uuid::new_v4(), "alice", None, 0))
            .await
            .unwrap();
        let mut tx = database.begin().await.unwrap();
        let m = tx.member(member.member_id).await.unwrap();
        tx.put_member(m.credit(10).unwrap());
        tx.append_point_record(PointRecord::new(member.member_id, 10, "welcome"));
        tx.commit().await.unwrap();

        assert_that!(database.delete_member(member.member_id).await).is_ok();
        assert_that!(database.get_point_records(member.member_id).await.unwrap()).is_empty();
        assert_that!(database.delete_member(member.member_id).await)
            .is_err()
            .matches(|err| matches!(err, Error::MemberDoesNotExist(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicates_rejected(new_product: NewProduct) {
        let database = MemoryDatabase::default();
        let member = Member::new(Uuid::new_v4(), "alice", None, 100);
        database.insert_member(member.clone()).await.unwrap();
        database.insert_product(new_product.clone()).await.unwrap();

        let res = database
            .insert_member(Member::new(member.member_id, "mallory", None, 1_000))
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::MemberAlreadyExists(id) if *id == member.member_id));
        assert_that!(database.insert_product(new_product).await)
            .is_err()
            .matches(|err| matches!(err, Error::DuplicateProductName(name) if name == "Cola"));

        // The existing rows are untouched
        assert_that!(database.get_member(member.member_id).await.unwrap()).is_equal_to(member);
        assert_that!(database.list_products().await.unwrap()).has_length(1);
    }

    #[tokio::test]
    async fn test_reinserted_member_conflicts_with_stale_read() {
        // GIVEN a transaction that read a member
        let database = MemoryDatabase::default();
        let member = database
            .insert_member(Member::new(Uuid::new_v4(), "alice", None, 100))
            .await
            .unwrap();
        let mut tx = database.begin().await.unwrap();
        let stale = tx.member(member.member_id).await.unwrap();

        // WHEN the member is deleted and inserted again before the commit
        database.delete_member(member.member_id).await.unwrap();
        database
            .insert_member(Member::new(member.member_id, "alice", None, 5))
            .await
            .unwrap();
        tx.put_member(stale.debit(50).unwrap());

        // THEN the stale write is refused
        assert_that!(tx.commit().await)
            .is_err()
            .matches(|err| matches!(err, Error::Conflict));
        assert_that!(database.get_member(member.member_id).await.unwrap().points())
            .is_equal_to(5);
    }
}
