use crate::config::DatabaseConfig;
use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Fields every member must carry
const REQUIRED_FIELDS: [&str; 3] = ["nome", "dataNascimento", "cargo"];

/// Failure of a record store operation
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field is missing or a value is malformed
    #[error("{0}")]
    Validation(String),
    /// The id is not a valid ObjectId
    #[error("Cast to ObjectId failed for value \"{0}\" at path \"_id\" for model \"Member\"")]
    InvalidId(String),
    /// No member has the requested id
    #[error("Membro não encontrado")]
    NotFound,
    /// The document store could not be reached or rejected the operation
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Member as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Store-generated id (hex ObjectId)
    #[serde(rename = "_id")]
    pub id: String,
    pub nome: String,
    pub data_nascimento: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefone: Option<String>,
    pub cargo: String,
    /// Public photo URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto: Option<String>,
}

/// Caller-supplied fields for a new member.
///
/// Required fields are optional here so that their absence surfaces as a
/// [`StoreError::Validation`] rather than a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub nome: Option<String>,
    pub data_nascimento: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
    pub cargo: Option<String>,
    pub foto: Option<String>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPatch {
    pub nome: Option<String>,
    pub data_nascimento: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
    pub cargo: Option<String>,
    pub foto: Option<String>,
}

/// Member document as persisted in MongoDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub nome: String,
    pub data_nascimento: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefone: Option<String>,
    pub cargo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto: Option<String>,
}

impl NewMember {
    /// Check required fields and build a document with a fresh id
    pub fn into_document(self) -> Result<MemberDocument, StoreError> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .zip([&self.nome, &self.data_nascimento, &self.cargo])
            .filter(|(_, value)| is_blank(value.as_deref()))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(validation_error(&missing));
        }

        Ok(MemberDocument {
            id: ObjectId::new(),
            nome: self.nome.unwrap_or_default(),
            data_nascimento: self.data_nascimento.unwrap_or_default(),
            endereco: self.endereco,
            telefone: self.telefone,
            cargo: self.cargo.unwrap_or_default(),
            foto: self.foto,
        })
    }
}

impl MemberPatch {
    /// Reject updates that would blank out a required field
    pub fn validate(&self) -> Result<(), StoreError> {
        let blanked: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .zip([&self.nome, &self.data_nascimento, &self.cargo])
            .filter(|(_, value)| matches!(value.as_deref(), Some(v) if v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if blanked.is_empty() {
            Ok(())
        } else {
            Err(validation_error(&blanked))
        }
    }

    /// `$set` document holding only the fields present in the patch
    pub fn to_set_document(&self) -> Document {
        let mut set = Document::new();
        let fields = [
            ("nome", &self.nome),
            ("dataNascimento", &self.data_nascimento),
            ("endereco", &self.endereco),
            ("telefone", &self.telefone),
            ("cargo", &self.cargo),
            ("foto", &self.foto),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                set.insert(key, value.as_str());
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.to_set_document().is_empty()
    }
}

impl MemberDocument {
    /// Merge a patch into this document in place
    pub fn apply(&mut self, patch: MemberPatch) {
        if let Some(nome) = patch.nome {
            self.nome = nome;
        }
        if let Some(data_nascimento) = patch.data_nascimento {
            self.data_nascimento = data_nascimento;
        }
        if let Some(cargo) = patch.cargo {
            self.cargo = cargo;
        }
        if patch.endereco.is_some() {
            self.endereco = patch.endereco;
        }
        if patch.telefone.is_some() {
            self.telefone = patch.telefone;
        }
        if patch.foto.is_some() {
            self.foto = patch.foto;
        }
    }
}

impl From<MemberDocument> for Member {
    fn from(d: MemberDocument) -> Self {
        Self {
            id: d.id.to_hex(),
            nome: d.nome,
            data_nascimento: d.data_nascimento,
            endereco: d.endereco,
            telefone: d.telefone,
            cargo: d.cargo,
            foto: d.foto,
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn validation_error(fields: &[&str]) -> StoreError {
    let details: Vec<String> = fields.iter().map(|f| format!("{f} is required")).collect();
    StoreError::Validation(format!("Member validation failed: {}", details.join(", ")))
}

fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Persistence for member records
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// All members, ascending by `nome`
    async fn list(&self) -> Result<Vec<Member>, StoreError>;

    async fn create(&self, new_member: NewMember) -> Result<Member, StoreError>;

    /// Merge `patch` into the member with `id` and return the result
    async fn update(&self, id: &str, patch: MemberPatch) -> Result<Member, StoreError>;

    /// Remove the member with `id`, returning what was removed
    async fn delete(&self, id: &str) -> Result<Member, StoreError>;

    /// Round-trip to the backend
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// MongoDB-backed member store
pub struct MongoMemberStore {
    database: Database,
    collection: Collection<MemberDocument>,
}

impl MongoMemberStore {
    /// Create a new store; the driver connects lazily and pools connections
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .context("Failed to parse MongoDB connection string")?;
        options.app_name = Some("members-service".to_string());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());
        options.max_pool_size = Some(config.max_pool_size);

        let client = Client::with_options(options).context("Failed to create MongoDB client")?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(&config.name));
        let collection = database.collection::<MemberDocument>(&config.collection);

        let store = Self {
            database,
            collection,
        };

        // Startup continues without the database; requests fail until it is reachable.
        match store.health_check().await {
            Ok(()) => info!(
                database = %store.database.name(),
                collection = %config.collection,
                "Connected to MongoDB"
            ),
            Err(e) => warn!(error = %e, "MongoDB not reachable at startup"),
        }

        Ok(store)
    }
}

#[async_trait]
impl MemberStore for MongoMemberStore {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Member>, StoreError> {
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "nome": 1 })
            .await?;
        let documents: Vec<MemberDocument> = cursor.try_collect().await?;

        debug!(count = documents.len(), "Listed members");

        Ok(documents.into_iter().map(Member::from).collect())
    }

    #[instrument(skip(self, new_member))]
    async fn create(&self, new_member: NewMember) -> Result<Member, StoreError> {
        let document = new_member.into_document()?;
        self.collection.insert_one(&document).await?;

        debug!(id = %document.id, "Member created");
        metrics::counter!("members.created").increment(1);

        Ok(document.into())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: MemberPatch) -> Result<Member, StoreError> {
        let oid = parse_id(id)?;
        patch.validate()?;

        let set = patch.to_set_document();
        if set.is_empty() {
            let document = self
                .collection
                .find_one(doc! { "_id": oid })
                .await?
                .ok_or(StoreError::NotFound)?;
            return Ok(document.into());
        }

        let document = self
            .collection
            .find_one_and_update(doc! { "_id": oid }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(StoreError::NotFound)?;
        metrics::counter!("members.updated").increment(1);

        Ok(document.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<Member, StoreError> {
        let oid = parse_id(id)?;
        let document = self
            .collection
            .find_one_and_delete(doc! { "_id": oid })
            .await?
            .ok_or(StoreError::NotFound)?;

        metrics::counter!("members.deleted").increment(1);

        Ok(document.into())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

/// Process-local member store backing the handler and store tests
#[derive(Default)]
pub struct InMemoryMemberStore {
    documents: RwLock<Vec<MemberDocument>>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn list(&self) -> Result<Vec<Member>, StoreError> {
        let mut documents = self.documents.read().await.clone();
        documents.sort_by(|a, b| a.nome.cmp(&b.nome));
        Ok(documents.into_iter().map(Member::from).collect())
    }

    async fn create(&self, new_member: NewMember) -> Result<Member, StoreError> {
        let document = new_member.into_document()?;
        self.documents.write().await.push(document.clone());
        metrics::counter!("members.created").increment(1);
        Ok(document.into())
    }

    async fn update(&self, id: &str, patch: MemberPatch) -> Result<Member, StoreError> {
        let oid = parse_id(id)?;
        patch.validate()?;

        let mut documents = self.documents.write().await;
        let document = documents
            .iter_mut()
            .find(|d| d.id == oid)
            .ok_or(StoreError::NotFound)?;
        if !patch.is_empty() {
            document.apply(patch);
            metrics::counter!("members.updated").increment(1);
        }

        Ok(document.clone().into())
    }

    async fn delete(&self, id: &str) -> Result<Member, StoreError> {
        let oid = parse_id(id)?;

        let mut documents = self.documents.write().await;
        let index = documents
            .iter()
            .position(|d| d.id == oid)
            .ok_or(StoreError::NotFound)?;
        metrics::counter!("members.deleted").increment(1);

        Ok(documents.remove(index).into())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
