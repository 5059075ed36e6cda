// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub camera: CameraCfg,
    pub scene: SceneCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "prism".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    pub texture: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            vertex_shader: None,
            fragment_shader: None,
            texture: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CameraCfg {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 2.0, -10.0],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SceneCfg {
    pub cubes: u32,
    pub spacing: f32,
    pub floor: bool,
}

impl Default for SceneCfg {
    fn default() -> Self {
        Self {
            cubes: 25,
            spacing: 4.0,
            floor: true,
        }
    }
}

/// Missing or malformed files fall back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [scene]
            cubes = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(cfg.scene.cubes, 3);
        assert_eq!(cfg.scene.spacing, 4.0);
        assert!(cfg.scene.floor);
        assert_eq!(cfg.camera.fov_degrees, 45.0);
        assert_eq!(cfg.window.title, "prism");
        assert!(cfg.render.texture.is_none());
    }

    #[test]
    fn shader_and_texture_paths() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [render]
            vertex_shader = "shaders/a.vert.spv"
            fragment_shader = "shaders/a.frag.spv"
            texture = "assets/crate.png"
            validation = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.vertex_shader, Some(PathBuf::from("shaders/a.vert.spv")));
        assert_eq!(cfg.render.texture, Some(PathBuf::from("assets/crate.png")));
        assert!(!cfg.render.validation);
    }

    #[test]
    fn clear_color_is_reread_from_disk() {
        let path = std::env::temp_dir().join(format!("prism-clear-{}.toml", std::process::id()));
        fs::write(&path, "[render]\nclear_color = [0.2, 0.4, 0.6, 1.0]\n").unwrap();
        let first = load_cfg(&path).render.clear_color;
        fs::write(&path, "[render]\nclear_color = [1.0, 0.0, 0.0, 1.0]\n").unwrap();
        let second = load_cfg(&path).render.clear_color;
        let _ = fs::remove_file(&path);
        assert_eq!(first, [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(second, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/prism.toml"));
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.camera.far, 1000.0);
    }
}
