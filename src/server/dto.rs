use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    /// Subject name; created on first use.
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForkRepoRequest {
    /// Defaults to the base repository's name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchSubjectsParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}
