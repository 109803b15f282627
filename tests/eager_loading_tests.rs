/// Eager loading tests
///
/// Aggregates with embedded children come back whole, and nested paths can be queried
/// Run with: cargo test --test eager_loading_tests

use futures::StreamExt;
use reactive_em::storage::MemoryStore;
use reactive_em::{Entity, ReactiveEntityManager};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Child {
    name: String,
    age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Address {
    city: String,
    zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Parent {
    id: Uuid,
    name: String,
    address: Address,
    children: Vec<Child>,
}

impl Entity for Parent {
    const NAME: &'static str = "Parent";
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }
}

fn parent(name: &str, city: &str, zip: Option<&str>, children: &[(&str, u32)]) -> Parent {
    Parent {
        id: Uuid::new_v4(),
        name: name.to_string(),
        address: Address {
            city: city.to_string(),
            zip: zip.map(str::to_string),
        },
        children: children
            .iter()
            .map(|(name, age)| Child {
                name: name.to_string(),
                age: *age,
            })
            .collect(),
    }
}

async fn setup() -> (ReactiveEntityManager, Vec<Parent>) {
    let em = ReactiveEntityManager::with_store(MemoryStore::new());
    let parents = vec![
        parent("Ann", "Oslo", Some("0150"), &[("Bo", 4), ("Cy", 7)]),
        parent("Dan", "Bergen", None, &[]),
        parent("Eve", "Oslo", None, &[("Fay", 2)]),
    ];
    em.persist(parents.clone()).await.unwrap();
    (em, parents)
}

#[tokio::test]
async fn test_find_returns_children_after_context_closed() {
    let (em, parents) = setup().await;

    let found = em.find::<Parent>(parents[0].id).await.unwrap().unwrap();

    assert_eq!(found.children.len(), 2);
    assert_eq!(found, parents[0]);
}

#[tokio::test]
async fn test_query_by_nested_path() {
    let (em, parents) = setup().await;

    let in_oslo: Vec<String> = em
        .create_query::<Parent>("select p from Parent p where p.address.city = :city order by p.name desc")
        .set_parameter("city", "Oslo")
        .result_list()
        .subscribe()
        .map(|item| item.unwrap().name)
        .collect()
        .await;

    assert_eq!(in_oslo, vec![parents[2].name.clone(), parents[0].name.clone()]);
}

#[tokio::test]
async fn test_null_nested_field() {
    let (em, _parents) = setup().await;

    let names = em
        .create_query::<String>("select p.name from Parent p where p.address.zip is null order by p.name")
        .result_list()
        .collect_list()
        .await;

    assert_eq!(names, Ok(Some(vec!["Dan".to_string(), "Eve".to_string()])));
}

#[tokio::test]
async fn test_project_embedded_collection() {
    let (em, parents) = setup().await;

    let children = em
        .create_query::<Vec<Child>>("select p.children from Parent p where p.id = :id")
        .set_parameter("id", parents[0].id)
        .single_result()
        .await;

    assert_eq!(children, Ok(Some(parents[0].children.clone())));
}

#[tokio::test]
async fn test_bulk_update_of_nested_field() {
    let (em, parents) = setup().await;

    let moved = em
        .create_untyped_query("update Parent p set p.address.city = :to where p.address.city = :from")
        .set_parameter("from", "Oslo")
        .set_parameter("to", "Trondheim")
        .execute_update()
        .await;
    assert_eq!(moved, Ok(Some(2)));

    let ann = em.find::<Parent>(parents[0].id).await.unwrap().unwrap();
    assert_eq!(ann.address.city, "Trondheim");
    assert_eq!(ann.children, parents[0].children);
}
