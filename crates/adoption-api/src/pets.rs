//! Pet listings

use reqwest::Method;

use crate::client::{cache_scope, segment, AdoptionClient, PETS_RE, PETS_TTL, PET_DETAIL_TTL};
use crate::error::Result;
use crate::types::{Page, Pet, PetFilters, PetInput};

impl AdoptionClient {
    /// Browse adoptable pets. Public; cached per filter combination.
    pub async fn list_pets(&self, filters: &PetFilters) -> Result<Page<Pet>> {
        self.cached_get("pets", &filters.to_query(), None, None, PETS_TTL)
            .await
    }

    pub async fn get_pet(&self, id: &str) -> Result<Pet> {
        let path = format!("pets/{}", segment(id));
        self.cached_get(&path, &[], None, None, PET_DETAIL_TTL)
            .await
    }

    /// Listings owned by the token's user
    pub async fn my_pets(&self, token: &str) -> Result<Vec<Pet>> {
        let scope = cache_scope(token);
        self.cached_get("pets/mine", &[], Some(token), Some(&scope), PETS_TTL)
            .await
    }

    pub async fn create_pet(&self, token: &str, input: &PetInput) -> Result<Pet> {
        let pet = self
            .send_json(Method::POST, "pets", Some(input), Some(token))
            .await?;
        self.invalidate(&PETS_RE);
        Ok(pet)
    }

    pub async fn update_pet(&self, token: &str, id: &str, input: &PetInput) -> Result<Pet> {
        let path = format!("pets/{}", segment(id));
        let pet = self
            .send_json(Method::PUT, &path, Some(input), Some(token))
            .await?;
        self.invalidate(&PETS_RE);
        self.invalidate_scoped(&cache_scope(token), "favorites");
        Ok(pet)
    }

    pub async fn delete_pet(&self, token: &str, id: &str) -> Result<()> {
        let path = format!("pets/{}", segment(id));
        self.send_unit(Method::DELETE, &path, None::<&()>, Some(token))
            .await?;
        self.invalidate(&PETS_RE);
        // Favorites embed pet records
        self.invalidate_scoped(&cache_scope(token), "favorites");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use crate::error::ApiError;
    use crate::types::PetStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pet_json(id: u32, name: &str) -> serde_json::Value {
        json!({ "id": id, "name": name, "species": "cat", "status": "available" })
    }

    #[tokio::test]
    async fn test_list_pets_with_filters_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pets"))
            .and(query_param("species", "cat"))
            .and(query_param("goodWithKids", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [pet_json(1, "Miso"), pet_json(2, "Tofu")],
                "total": 2,
                "page": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let filters = PetFilters {
            species: Some("cat".into()),
            good_with_kids: Some(true),
            ..Default::default()
        };

        let first = client.list_pets(&filters).await.unwrap();
        let second = client.list_pets(&filters).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].name, "Miso");
        assert!(client.cache().has("pets?goodWithKids=true&species=cat"));
    }

    #[tokio::test]
    async fn test_update_pet_invalidates_listings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pets"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "items": [pet_json(1, "Miso")] })),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/pets/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1, "name": "Miso", "status": "adopted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.cache().set("favorites-unrelated", json!(1));
        let favorites_key = format!("user:{}:favorites", cache_scope("token"));
        client.cache().set(favorites_key.clone(), json!([pet_json(1, "Miso")]));
        let filters = PetFilters::default();

        client.list_pets(&filters).await.unwrap();
        let updated = client
            .update_pet(
                "token",
                "1",
                &PetInput {
                    status: Some(PetStatus::Adopted),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, PetStatus::Adopted);

        assert!(!client.cache().has("pets"));
        // Favorites embed the edited pet
        assert!(!client.cache().has(&favorites_key));
        assert!(client.cache().has("favorites-unrelated"));
        // Listing is fetched again after the edit
        client.list_pets(&filters).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_pet_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pets/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Pet not found" })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_pet("404").await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Pet not found".into()));
    }

    #[tokio::test]
    async fn test_delete_pet_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/pets/7"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": "Only the listing owner can delete this pet"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.cache().set("pets/7", json!({ "id": 7, "name": "Pip" }));

        let err = client.delete_pet("token", "7").await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
        // Failed writes leave the cache alone
        assert!(client.cache().has("pets/7"));
    }
}
