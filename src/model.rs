use crate::error::{Error, Result};
use crate::template::ChatTemplateFormat;
use lazy_static::lazy_static;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::params::kv_overrides::ParamOverrideValue;
use llama_cpp_2::{LogOptions, send_logs_to_tracing};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::pin::pin;
use tracing::{info, warn};

/// Layer count handed to llama.cpp when every layer should be offloaded
const ALL_GPU_LAYERS: u32 = 1000;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// The llama backend may only be initialized once per process
lazy_static! {
    static ref LLAMA_BACKEND: std::result::Result<LlamaBackend, String> = {
        send_logs_to_tracing(LogOptions::default().with_logs_enabled(false));
        LlamaBackend::init().map_err(|e| e.to_string())
    };
}

/// Shared llama backend, initialized on first use
pub(crate) fn backend() -> Result<&'static LlamaBackend> {
    LLAMA_BACKEND
        .as_ref()
        .map_err(|e| Error::BackendInitError(e.clone()))
}

/// A loaded model, ready to answer chat completions
pub struct Model {
    pub(crate) model: LlamaModel,
    pub(crate) context_params: ContextParams,
    pub(crate) template_format: ChatTemplateFormat,
}

impl Model {
    /// Load a model from disk with the given parameters
    pub fn new(params: &ModelParams, context_params: &ContextParams) -> Result<Self> {
        let model_params = LlamaModelParams::default()
            .with_n_gpu_layers(params.n_gpu_layers());
        let model_params = match params.main_gpu {
            Some(main_gpu) => model_params.with_main_gpu(main_gpu),
            None => model_params,
        };

        let mut model_params = pin!(model_params);

        // Apply key-value overrides
        for (k, v) in &params.key_value_overrides {
            let k = CString::new(k.as_bytes())
                .map_err(|e| Error::ParseError(format!("invalid key {}: {}", k, e)))?;
            let v = param_override(v).map_err(|e| {
                Error::ParseError(format!("invalid value {} for key {k:?}: {}", v, e))
            })?;
            model_params.as_mut().append_kv_override(k.as_c_str(), v);
        }

        let model = LlamaModel::load_from_file(backend()?, &params.model_path, &model_params)
            .map_err(|e| Error::ModelUnavailable(format!("unable to load model: {}", e)))?;

        Ok(Self {
            model,
            context_params: context_params.clone(),
            template_format: ChatTemplateFormat::ModelDefault,
        })
    }

    /// Use another chat template for every completion
    pub fn with_template(mut self, template_format: ChatTemplateFormat) -> Self {
        self.template_format = template_format;
        self
    }

    pub fn context_params(&self) -> &ContextParams {
        &self.context_params
    }
}

#[derive(Debug, Clone)]
pub struct ModelParams {
    /// The path to the GGUF model file
    pub model_path: PathBuf,
    /// Layers to offload: -1 for all, 0 for CPU only
    pub gpu_layers: i32,
    /// GPU used for scratch and small tensors (default: chosen by llama.cpp)
    pub main_gpu: Option<i32>,
    /// override some parameters of the model
    pub key_value_overrides: Vec<(String, String)>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            gpu_layers: -1,
            main_gpu: None,
            key_value_overrides: Vec::new(),
        }
    }
}

impl ModelParams {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    fn n_gpu_layers(&self) -> u32 {
        u32::try_from(self.gpu_layers).unwrap_or(ALL_GPU_LAYERS)
    }
}

/// Parameters for creating a context
#[derive(Debug, Clone)]
pub struct ContextParams {
    /// size of the prompt context (default: 2048)
    pub ctx_size: u32,
    /// maximum tokens submitted in one decode call (default: 512)
    pub batch_size: u32,
    /// number of threads to use during generation (default: use all available threads)
    pub threads: Option<usize>,
    /// number of threads to use during batch and prompt processing (default: use all available threads)
    pub threads_batch: Option<usize>,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            ctx_size: 2048,
            batch_size: 512,
            threads: None,
            threads_batch: None,
        }
    }
}

/// Finds, loads and unloads a model
pub struct ModelLoader {
    params: ModelParams,
    context_params: ContextParams,
    model: Option<Model>,
}

impl ModelLoader {
    pub fn new(params: ModelParams, context_params: ContextParams) -> Self {
        Self {
            params,
            context_params,
            model: None,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Check that the model file exists, returning its size in bytes.
    ///
    /// A missing `.gguf` extension is only warned about.
    pub fn validate_model_path(&self) -> Result<u64> {
        validate_model_path(&self.params.model_path)
    }

    /// Load the model, or return the one already loaded
    pub fn load(&mut self) -> Result<&Model> {
        let model = match self.model.take() {
            Some(model) => model,
            None => self.load_from_disk()?,
        };
        let model: &Model = self.model.insert(model);
        Ok(model)
    }

    fn load_from_disk(&self) -> Result<Model> {
        self.validate_model_path()?;

        let path = &self.params.model_path;
        info!("Loading model: {}", file_name(path));
        info!("GPU layers: {}", self.params.gpu_layers);
        info!("Context size: {}", self.context_params.ctx_size);

        let model = Model::new(&self.params, &self.context_params)?;
        info!("Model loaded successfully!");

        match self.params.gpu_layers {
            n if n > 0 => info!("Model configured to use {} GPU layers", n),
            0 => warn!("Model configured for CPU-only usage"),
            _ => info!("Model configured to use ALL layers on GPU"),
        }

        Ok(model)
    }

    /// The loaded model, if any
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Check if the model is loaded
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Release the model and everything llama.cpp allocated for it
    pub fn unload(&mut self) {
        if self.model.take().is_some() {
            info!("Model unloaded");
        }
    }
}

/// Check that `path` is an existing regular file, returning its size in bytes
pub fn validate_model_path(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::ModelUnavailable(format!("model file not found: {} ({})", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(Error::ModelUnavailable(format!(
            "model path is not a file: {}",
            path.display()
        )));
    }

    if !has_gguf_extension(path) {
        log::warn!(
            "Model file doesn't have .gguf extension: {}",
            path.display()
        );
    }

    let size = metadata.len();
    info!("Model file found: {}", file_name(path));
    info!("File size: {:.2} GB", size as f64 / GIB);

    Ok(size)
}

fn has_gguf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Split a `KEY=value` override as given on the command line
pub fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| Error::ParseError(format!("invalid KEY=value: no `=` found in `{}`", s)))?;
    param_override(value)?;
    Ok((key.to_string(), value.to_string()))
}

// Helper function to parse key-value pairs for model parameters
fn param_override(s: &str) -> Result<ParamOverrideValue> {
    use std::str::FromStr;

    i64::from_str(s)
        .map(ParamOverrideValue::Int)
        .or_else(|_| f64::from_str(s).map(ParamOverrideValue::Float))
        .or_else(|_| bool::from_str(s).map(ParamOverrideValue::Bool))
        .map_err(|_| Error::ParseError("must be one of i64, f64, or bool".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_model_unavailable() {
        let loader = ModelLoader::new(
            ModelParams::new("/nonexistent/model.gguf"),
            ContextParams::default(),
        );
        assert!(matches!(
            loader.validate_model_path(),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn directory_is_not_a_model() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_model_path(dir.path()),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn existing_file_reports_size() {
        let mut file = tempfile::Builder::new().suffix(".gguf").tempfile().unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        assert_eq!(validate_model_path(file.path()).unwrap(), 128);
    }

    #[test]
    fn other_extensions_are_accepted() {
        let file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        assert!(validate_model_path(file.path()).is_ok());
        assert!(!has_gguf_extension(file.path()));
        assert!(has_gguf_extension(Path::new("model.GGUF")));
    }

    #[test]
    fn load_of_missing_file_fails_before_touching_llama() {
        let mut loader = ModelLoader::new(
            ModelParams::new("/nonexistent/model.gguf"),
            ContextParams::default(),
        );
        assert!(matches!(loader.load(), Err(Error::ModelUnavailable(_))));
        assert!(!loader.is_loaded());
    }

    #[test]
    fn unload_without_model_is_noop() {
        let mut loader = ModelLoader::new(ModelParams::default(), ContextParams::default());
        loader.unload();
        assert!(!loader.is_loaded());
        assert!(loader.model().is_none());
    }

    #[test]
    fn gpu_layer_mapping() {
        let mut params = ModelParams::default();
        assert_eq!(params.n_gpu_layers(), ALL_GPU_LAYERS);
        params.gpu_layers = 0;
        assert_eq!(params.n_gpu_layers(), 0);
        params.gpu_layers = 20;
        assert_eq!(params.n_gpu_layers(), 20);
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("llama.context_length=4096").unwrap(),
            ("llama.context_length".to_string(), "4096".to_string())
        );
        assert!(parse_key_val("flag=true").is_ok());
        assert!(matches!(parse_key_val("novalue"), Err(Error::ParseError(_))));
        assert!(matches!(parse_key_val("k=abc"), Err(Error::ParseError(_))));
    }
}
