use std::{env, path::PathBuf};

use directories::ProjectDirs;

use crate::{errors::Error, fs_utils};

/// Nombre de la ENV var para override de ruta base (modo “portable”)
pub const ENV_BASE_DIR: &str = "KARAOKE_BASE_DIR";

/// Rutas propias de la aplicación (no de una ejecución concreta)
#[derive(Debug, Clone)]
pub struct AppPaths {
    // config_dir
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,

    // data_dir
    pub data_dir: PathBuf,
    pub last_run_file: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, Error> {
        let (config_dir, data_dir) = if let Ok(base) = env::var(ENV_BASE_DIR) {
            let b = PathBuf::from(base);
            (b.join("config"), b.join("data"))
        } else {
            let proj = ProjectDirs::from("com", "Karaoke", "KaraokePacker").ok_or(Error::NoHome)?;
            (proj.config_dir().to_path_buf(), proj.data_dir().to_path_buf())
        };

        let paths = AppPaths {
            config_dir: config_dir.clone(),
            settings_file: config_dir.join("settings.toml"),

            data_dir: data_dir.clone(),
            last_run_file: data_dir.join("last_run.json"),
        };

        paths.ensure_structure()?;
        paths.validate_structure()?;

        Ok(paths)
    }

    /// Crea las carpetas base. El fichero de settings es opcional y no se crea.
    pub fn ensure_structure(&self) -> Result<(), Error> {
        fs_utils::ensure_dir(&self.config_dir)?;
        fs_utils::ensure_dir(&self.data_dir)?;
        Ok(())
    }

    /// Valida que cada carpeta existe Y es escribible. Si falta, la intenta crear.
    pub fn validate_structure(&self) -> Result<(), Error> {
        for dir in [&self.config_dir, &self.data_dir] {
            if !dir.exists() {
                fs_utils::ensure_dir(dir)?;
            }
            fs_utils::check_writable(dir)?;
        }
        Ok(())
    }
}
