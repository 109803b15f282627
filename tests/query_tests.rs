/// Query tests
///
/// Typed and untyped queries, single results, bulk update/delete and paging
/// Run with: cargo test --test query_tests

use futures::StreamExt;
use reactive_em::storage::MemoryStore;
use reactive_em::{Entity, ErrorKind, PersistenceError, ReactiveEntityManager};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    id: String,
    title: String,
    pages: u32,
}

impl Entity for Book {
    const NAME: &'static str = "Book";
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }
}

fn book(title: &str, pages: u32) -> Book {
    Book {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        pages,
    }
}

async fn setup_with_books(books: &[Book]) -> (MemoryStore, ReactiveEntityManager) {
    let store = MemoryStore::new();
    let em = ReactiveEntityManager::with_store(store.clone());
    em.persist(books.to_vec()).await.unwrap();
    (store, em)
}

#[tokio::test]
async fn test_result_list_with_in_parameter() {
    let books = vec![book("a", 100), book("b", 200), book("c", 300)];
    let (_store, em) = setup_with_books(&books).await;

    let ids = vec![books[0].id.clone(), books[2].id.clone()];
    let found: Vec<Book> = em
        .create_query::<Book>("select b from Book b where b.id in :ids order by b.title")
        .set_parameter("ids", &ids)
        .result_list()
        .subscribe()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(found, vec![books[0].clone(), books[2].clone()]);
}

#[tokio::test]
async fn test_untyped_result_list() {
    let books = vec![book("Rust in Action", 450), book("Programming Rust", 700)];
    let (_store, em) = setup_with_books(&books).await;

    let titles = em
        .create_untyped_query("select b.title from Book b where b.title like '%Rust%' order by b.title")
        .get_result_list::<String>()
        .collect_list()
        .await
        .unwrap();

    assert_eq!(
        titles,
        Some(vec![
            "Programming Rust".to_string(),
            "Rust in Action".to_string()
        ])
    );
}

#[tokio::test]
async fn test_empty_result_list_completes_without_items() {
    let (_store, em) = setup_with_books(&[book("a", 1)]).await;

    let stream = em
        .create_query::<Book>("select b from Book b where b.pages > :min")
        .set_parameter("min", 1000)
        .result_list();

    let items: Vec<_> = stream.subscribe().collect().await;
    assert!(items.is_empty());
    assert_eq!(stream.collect_list().await, Ok(Some(vec![])));
}

#[tokio::test]
async fn test_single_result_found() {
    let books = vec![book("a", 100), book("b", 200)];
    let (_store, em) = setup_with_books(&books).await;

    let found = em
        .create_query::<Book>("select b from Book b where b.id = :id")
        .set_parameter("id", &books[1].id)
        .single_result()
        .await;

    assert_eq!(found, Ok(Some(books[1].clone())));
}

#[tokio::test]
async fn test_single_result_empty() {
    let (_store, em) = setup_with_books(&[book("a", 100)]).await;

    let found = em
        .create_untyped_query("select b from Book b where b.id = :id")
        .set_parameter("id", "missing")
        .get_single_result::<Book>()
        .await;

    assert_eq!(found, Ok(None));
}

#[tokio::test]
async fn test_single_result_non_unique() {
    let (_store, em) = setup_with_books(&[book("a", 100), book("b", 100)]).await;

    let err = em
        .create_query::<Book>("select b from Book b where b.pages = 100")
        .single_result()
        .await
        .unwrap_err();

    assert_eq!(err, PersistenceError::NonUniqueResult(2));
    assert_eq!(err.kind(), ErrorKind::NonUniqueResult);
}

#[tokio::test]
async fn test_execute_update_changes_rows() {
    let books = vec![book("old", 100), book("other", 200)];
    let (_store, em) = setup_with_books(&books).await;

    let updated = em
        .create_untyped_query("update Book b set b.title = :title where b.id = :id")
        .set_parameter("title", "new")
        .set_parameter("id", &books[0].id)
        .execute_update()
        .await;
    assert_eq!(updated, Ok(Some(1)));

    let reloaded = em.find::<Book>(&books[0].id).await.unwrap().unwrap();
    assert_eq!(reloaded.title, "new");
    assert_eq!(
        em.find::<Book>(&books[1].id).await.unwrap(),
        Some(books[1].clone())
    );
}

#[tokio::test]
async fn test_execute_update_delete_counts() {
    let books = vec![book("a", 100), book("b", 200), book("c", 300)];
    let (store, em) = setup_with_books(&books).await;

    let deleted = em
        .create_untyped_query("delete from Book b where b.pages >= :min")
        .set_parameter("min", 200)
        .execute_update()
        .await;

    assert_eq!(deleted, Ok(Some(2)));
    assert_eq!(store.count("Book"), 1);

    let none = em
        .create_untyped_query("delete from Book b where b.pages > 1000")
        .execute_update()
        .await;
    assert_eq!(none, Ok(Some(0)));
}

#[tokio::test]
async fn test_failed_unit_of_work_rolls_back_update() {
    let books = vec![book("a", 100), book("b", 200)];
    let (_store, em) = setup_with_books(&books).await;

    let id = books[0].id.clone();
    let result = em
        .executor()
        .execute::<u64, _>(move |context| {
            let mut update =
                context.create_query("update Book b set b.title = 'changed' where b.id = :id")?;
            update.set_parameter("id", serde_json::json!(id))?;
            assert_eq!(update.execute_update()?, 1);
            drop(update);

            // Comparing a number with LIKE fails after the update was applied.
            context
                .create_query("select b from Book b where b.pages like '1%'")?
                .result_list()?;
            Ok(None)
        })
        .await;
    assert!(matches!(result, Err(PersistenceError::TypeMismatch(_))));

    assert_eq!(
        em.find::<Book>(&books[0].id).await.unwrap(),
        Some(books[0].clone())
    );
}

#[tokio::test]
async fn test_execute_update_outside_transaction_fails() {
    let (_store, em) = setup_with_books(&[book("a", 100)]).await;

    let err = em
        .executor()
        .execute_unmanaged::<u64, _>(|context| {
            context
                .create_query("delete from Book b")?
                .execute_update()
                .map(Some)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::TransactionRequired(_)));
}

#[tokio::test]
async fn test_paging() {
    let books: Vec<Book> = (1..=5).map(|n| book(&format!("t{}", n), n * 10)).collect();
    let (_store, em) = setup_with_books(&books).await;

    let page = em
        .create_query::<u32>("select b.pages from Book b order by b.pages")
        .set_first_result(1)
        .set_max_results(2)
        .result_list()
        .collect_list()
        .await;
    assert_eq!(page, Ok(Some(vec![20, 30])));

    let unpaged = em
        .create_query::<u32>("select b.pages from Book b order by b.pages desc")
        .set_first_result(0)
        .set_max_results(0)
        .result_list()
        .collect_list()
        .await;
    assert_eq!(unpaged, Ok(Some(vec![50, 40, 30, 20, 10])));
}

#[tokio::test]
async fn test_parameter_overwrite() {
    let books = vec![book("a", 100), book("b", 200)];
    let (_store, em) = setup_with_books(&books).await;

    let found = em
        .create_query::<Book>("select b from Book b where b.id = :id")
        .set_parameter("id", &books[0].id)
        .set_parameter("id", &books[1].id)
        .single_result()
        .await;

    assert_eq!(found, Ok(Some(books[1].clone())));
}

#[tokio::test]
async fn test_count_projection() {
    let (_store, em) = setup_with_books(&[book("a", 1), book("b", 2), book("c", 3)]).await;

    let count = em
        .create_query::<u64>("select count(b) from Book b where b.pages > 1")
        .single_result()
        .await;

    assert_eq!(count, Ok(Some(2)));
}

#[tokio::test]
async fn test_parse_error_is_persistence_failure() {
    let (store, em) = setup_with_books(&[]).await;

    let err = em
        .create_query::<Book>("select b from")
        .result_list()
        .collect_list()
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::ParseError(_)));
    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    assert_eq!(store.open_contexts(), 0);
}

#[tokio::test]
async fn test_missing_parameter_fails() {
    let (_store, em) = setup_with_books(&[book("a", 1)]).await;

    let err = em
        .create_query::<Book>("select b from Book b where b.id = :id")
        .single_result()
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::QueryError(_)));
}

#[tokio::test]
async fn test_unserializable_parameter_fails_on_execution() {
    use std::collections::HashMap;

    let (store, em) = setup_with_books(&[book("a", 1)]).await;
    let mut bad = HashMap::new();
    bad.insert(vec![1u8], 1);

    let query = em
        .create_query::<Book>("select b from Book b where b.id = :id")
        .set_parameter("id", bad);
    let created = store.contexts_created();

    let err = query.single_result().await.unwrap_err();
    assert!(matches!(err, PersistenceError::Serialization(_)));
    // The context is opened, the query is never created, and the context is closed again.
    assert_eq!(store.contexts_created(), created + 1);
    assert_eq!(store.open_contexts(), 0);
}

#[tokio::test]
async fn test_typed_keeps_parameters() {
    let books = vec![book("a", 100), book("b", 200)];
    let (_store, em) = setup_with_books(&books).await;

    let found = em
        .create_untyped_query("select b.title from Book b where b.pages > :min")
        .set_parameter("min", 150)
        .typed::<String>()
        .single_result()
        .await;

    assert_eq!(found, Ok(Some("b".to_string())));
}
