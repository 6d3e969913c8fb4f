use reqwest::Method;
use serde::Serialize;
use tracing::info;

use super::{ApiClient, ApiError, Listing};
use crate::models::Skill;

#[derive(Debug, Serialize)]
struct NewSkill<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl ApiClient {
    pub async fn list_skills(&self) -> Result<Vec<Skill>, ApiError> {
        let url = self.endpoint(&["api", "skills"])?;
        Ok(self.get_listing(url).await?.into_items())
    }

    /// Autocomplete lookup; `page` is zero-based.
    pub async fn search_skills(
        &self,
        name: &str,
        page: u32,
        size: u32,
    ) -> Result<Listing<Skill>, ApiError> {
        let url = self.endpoint_with_query(
            &["api", "skills", "search"],
            &[
                ("name", name.trim().to_string()),
                ("page", page.to_string()),
                ("size", size.to_string()),
            ],
        )?;
        self.get_listing(url).await
    }

    pub async fn create_skill(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Skill, ApiError> {
        let url = self.endpoint(&["api", "skills"])?;
        let payload = NewSkill {
            name: name.trim(),
            description,
        };
        let created: Option<Skill> = self.send_json(Method::POST, url, &payload).await?;
        info!(name = payload.name, "skill created");
        created.ok_or_else(|| ApiError::Parse("create skill returned an empty body".to_string()))
    }

    pub async fn update_skill(&self, skill: &Skill) -> Result<Skill, ApiError> {
        let url = self.endpoint(&["api", "skills", &skill.id])?;
        let updated: Option<Skill> = self.send_json(Method::PUT, url, skill).await?;
        Ok(updated.unwrap_or_else(|| skill.clone()))
    }

    pub async fn delete_skill(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "skills", id])?;
        self.send_empty(Method::DELETE, url).await?;
        info!(id, "skill deleted");
        Ok(())
    }
}
