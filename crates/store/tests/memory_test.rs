use store::{
    Clause, DocumentStore, HybridQuery, LexicalClause, MemoryStore, MovieDocument, NumericField,
    RangeClause, TextField, VectorClause,
};

fn movie(title: &str, year: i32, rating: f64, embedding: Vec<f32>) -> MovieDocument {
    MovieDocument {
        title: title.to_string(),
        overview_embedding: Some(embedding),
        released_year: Some(year),
        imdb_rating: Some(rating),
        ..Default::default()
    }
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    for doc in [
        movie("The Godfather", 1972, 9.2, vec![1.0, 0.0]),
        movie("Goodfellas", 1990, 8.7, vec![0.7, 0.7]),
        movie("Toy Story", 1995, 8.3, vec![0.0, 1.0]),
    ] {
        store.upsert(&doc.key(), &doc).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_conjunction_of_constraints() {
    let store = seeded().await;
    let query = HybridQuery::new(5)
        .with(Clause::Vector(VectorClause { vector: vec![1.0, 0.0], k: 5 }))
        .with(Clause::Range(RangeClause {
            field: NumericField::ImdbRating,
            min: Some(8.5),
            max: None,
        }))
        .with(Clause::Range(RangeClause {
            field: NumericField::ReleasedYear,
            min: Some(1980.0),
            max: Some(1999.0),
        }));

    let hits = store.hybrid_search(&query).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.title, "Goodfellas");
    assert_eq!(store.search_calls(), 1);
}

#[tokio::test]
async fn test_lexical_browse_uses_default_order() {
    let store = seeded().await;
    let query = HybridQuery::new(5).with(Clause::Lexical(LexicalClause {
        field: TextField::Title,
        phrase: "o".to_string(),
    }));
    assert!(store.hybrid_search(&query).await.unwrap().is_empty());

    let all = store.hybrid_search(&HybridQuery::new(2)).await.unwrap();
    let titles: Vec<_> = all.iter().map(|h| h.document.title.as_str()).collect();
    assert_eq!(titles, vec!["Toy Story", "Goodfellas"]);
}

#[tokio::test]
async fn test_overwrite_by_key() {
    let store = seeded().await;
    let mut doc = movie("Toy Story", 1995, 8.3, vec![0.0, 1.0]);
    doc.imdb_rating = Some(8.4);
    store.upsert(&doc.key(), &doc).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.upsert_calls(), 4);
    let stored = store.get("movie::toy-story::1995").await.unwrap().unwrap();
    assert_eq!(stored.imdb_rating, Some(8.4));
}

#[tokio::test]
async fn test_vector_ranking_within_title_matches() {
    let store = seeded().await;
    store
        .upsert("movie::the-godfather-part-ii::1974", &movie("The Godfather: Part II", 1974, 9.0, vec![0.6, 0.8]))
        .await
        .unwrap();

    let query = HybridQuery::new(5)
        .with(Clause::Vector(VectorClause { vector: vec![0.0, 1.0], k: 5 }))
        .with(Clause::Lexical(LexicalClause {
            field: TextField::Title,
            phrase: "godfather".to_string(),
        }));
    let hits = store.hybrid_search(&query).await.unwrap();
    let titles: Vec<_> = hits.iter().map(|h| h.document.title.as_str()).collect();
    assert_eq!(titles, vec!["The Godfather: Part II", "The Godfather"]);
    assert_eq!(hits[0].score, Some(0.8));
    assert_eq!(hits[1].score, Some(0.0));
}

#[tokio::test]
async fn test_punctuation_title_matches_nothing() {
    let store = seeded().await;
    let query = HybridQuery::new(5).with(Clause::Lexical(LexicalClause {
        field: TextField::Title,
        phrase: "!!".to_string(),
    }));
    assert!(store.hybrid_search(&query).await.unwrap().is_empty());
}
