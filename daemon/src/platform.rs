use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::PlatformError;

/// Placeholder replaced by the image path in command templates.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Makes an image the active desktop wallpaper.
///
/// Implementations block until the change has been applied and must be safe
/// to call repeatedly with the same path.
pub trait WallpaperSetter: Send + Sync {
    fn set(&self, path: &Path) -> Result<(), PlatformError>;
}

/// Applies wallpapers by running an external program.
#[derive(Debug, Clone)]
pub struct CommandSetter {
    argv: Vec<String>,
}

impl CommandSetter {
    /// Build a setter from an argv template containing [`PATH_PLACEHOLDER`].
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// The desktop's own wallpaper command, if this platform has one.
    pub fn platform_default() -> Option<Self> {
        #[cfg(target_os = "macos")]
        {
            Some(Self::new(vec![
                "osascript".to_string(),
                "-e".to_string(),
                format!(
                    "tell application \"Finder\" to set desktop picture to POSIX file \"{}\"",
                    PATH_PLACEHOLDER
                ),
            ]))
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            Some(Self::new(vec![
                "gsettings".to_string(),
                "set".to_string(),
                "org.gnome.desktop.background".to_string(),
                "picture-uri".to_string(),
                format!("'file://{}'", PATH_PLACEHOLDER),
            ]))
        }

        #[cfg(not(unix))]
        {
            None
        }
    }

    fn render(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

impl WallpaperSetter for CommandSetter {
    fn set(&self, path: &Path) -> Result<(), PlatformError> {
        let argv = self.render(path);
        let Some((program, args)) = argv.split_first() else {
            return Err(PlatformError::Unsupported);
        };

        log::debug!("Running wallpaper command: {:?}", argv);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PlatformError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PlatformError::Failed {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Used when neither the config nor the platform provide a command.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedSetter;

impl WallpaperSetter for UnsupportedSetter {
    fn set(&self, _path: &Path) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Pick the wallpaper action: configured command first, then the platform
/// default.
pub fn from_config(command: Option<&[String]>) -> Box<dyn WallpaperSetter> {
    match command {
        Some(argv) => Box::new(CommandSetter::new(argv.to_vec())),
        None => match CommandSetter::platform_default() {
            Some(setter) => Box::new(setter),
            None => {
                log::warn!("No wallpaper command for this platform; set [platform] command");
                Box::new(UnsupportedSetter)
            }
        },
    }
}

impl<T: WallpaperSetter + ?Sized> WallpaperSetter for Box<T> {
    fn set(&self, path: &Path) -> Result<(), PlatformError> {
        (**self).set(path)
    }
}
