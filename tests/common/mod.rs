#![allow(dead_code)]

use munisearch::config::SearchConfig;
use munisearch::{
    EmbeddingGenerator, EmbeddingMatrix, SearchService, Settings, VectorDimension, VectorError,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const S: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Snapshot files written into an isolated directory.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Three unit vectors: east, north, and the diagonal between them.
    pub fn scenario() -> Self {
        let project = Self::new();
        project.write_matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![S, S]]);
        project.add_file("map.json", r#"{"A": 0, "B": 1, "C": 2}"#);
        project.add_file(
            "meta.csv",
            "code,name,prefecture,population\nA,Alpha Town,Hokkaido,1000\nB,Beta City,Kyoto,2000\n",
        );
        project
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn write_matrix(&self, rows: Vec<Vec<f32>>) -> EmbeddingMatrix {
        let matrix = EmbeddingMatrix::from_rows(rows).expect("Invalid test matrix");
        matrix
            .save_npy(&self.dir.path().join("emb.npy"))
            .expect("Failed to write matrix");
        matrix
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.workspace_root = Some(self.dir.path().to_path_buf());
        settings.data.embeddings = "emb.npy".into();
        settings.data.mapping = "map.json".into();
        settings.data.metadata = "meta.csv".into();
        settings
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Deterministic generator: fixed vectors for known phrases, zeros otherwise.
pub struct KeywordGenerator {
    dimension: VectorDimension,
    vectors: HashMap<String, Vec<f32>>,
}

impl KeywordGenerator {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).expect("Invalid dimension"),
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// The generator used by the scenario project.
    pub fn compass() -> Arc<dyn EmbeddingGenerator> {
        Arc::new(
            Self::new(2)
                .with("east", vec![1.0, 0.0])
                .with("north", vec![0.0, 3.0])
                .with("north-east", vec![5.0, 5.0]),
        )
    }
}

impl EmbeddingGenerator for KeywordGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(*text)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.dimension.get()])
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// A generator whose model never works.
pub struct BrokenGenerator;

impl EmbeddingGenerator for BrokenGenerator {
    fn generate_embeddings(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Err(VectorError::EmbeddingFailed("inference session closed".to_string()))
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(2).expect("Invalid dimension")
    }

    fn model_name(&self) -> &str {
        "broken-test"
    }
}

/// Load `project` into a fresh service with `generator`.
pub fn loaded_service(
    project: &TestProject,
    generator: Arc<dyn EmbeddingGenerator>,
) -> SearchService {
    let settings = project.settings();
    let service = SearchService::new(SearchConfig::default());
    munisearch::service::loader::initialize_with(&service, &settings, generator);
    service
}
