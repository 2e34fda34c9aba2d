use reqwest::Method;

use crate::client::{cache_scope, segment, AdoptionClient, FAVORITES_TTL};
use crate::error::Result;
use crate::types::Favorite;

impl AdoptionClient {
    pub async fn favorites(&self, token: &str) -> Result<Vec<Favorite>> {
        let scope = cache_scope(token);
        self.cached_get("favorites", &[], Some(token), Some(&scope), FAVORITES_TTL)
            .await
    }

    pub async fn add_favorite(&self, token: &str, pet_id: &str) -> Result<()> {
        let path = format!("favorites/{}", segment(pet_id));
        self.send_unit(Method::POST, &path, None::<&()>, Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "favorites");
        Ok(())
    }

    pub async fn remove_favorite(&self, token: &str, pet_id: &str) -> Result<()> {
        let path = format!("favorites/{}", segment(pet_id));
        self.send_unit(Method::DELETE, &path, None::<&()>, Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "favorites");
        Ok(())
    }

    /// Whether `pet_id` is among the user's favorites (served from cache when fresh)
    pub async fn is_favorite(&self, token: &str, pet_id: &str) -> Result<bool> {
        Ok(self
            .favorites(token)
            .await?
            .iter()
            .any(|f| f.pet_id == pet_id))
    }
}

#[cfg(test)]
mod tests {
    use crate::client::tests::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_toggle_favorite_refreshes_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/favorites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "petId": 3, "pet": { "id": 3, "name": "Biscuit" } }
            ])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/favorites/5"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.is_favorite("tok", "3").await.unwrap());
        assert!(!client.is_favorite("tok", "5").await.unwrap());

        client.add_favorite("tok", "5").await.unwrap();
        let favorites = client.favorites("tok").await.unwrap();
        assert_eq!(favorites[0].pet.as_ref().unwrap().name, "Biscuit");
    }
}
