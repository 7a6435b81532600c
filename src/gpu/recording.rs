//! Headless device that records every command.
//!
//! Besides the raw command log it tracks the state a GL context would (bound
//! framebuffer, active program, texture slots, uniform values) so tests can
//! ask what a pass left behind.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{data_structures::model::MeshData, resources::texture::ImageData};

use super::{
    AttachedImage, AttachedImageInfo, AttachmentPoint, BlitSource, ClearFlags, ClipSpace, DepthFunc,
    FramebufferId, FramebufferStatus, FramebufferTarget, GpuDevice, MeshId, ProgramId, ProgramSource,
    ReleaseQueue, Releaser, RenderBufferDesc, RenderBufferId, ResourceId, TextureDesc, TextureId,
    UniformValue, check_completeness,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateTexture(TextureId, TextureDesc),
    ResizeTexture(TextureId, TextureDesc),
    UploadTexture {
        texture: TextureId,
        layer: u32,
        mip: u32,
        width: u32,
        height: u32,
    },
    CreateRenderBuffer(RenderBufferId, RenderBufferDesc),
    ResizeRenderBuffer(RenderBufferId, RenderBufferDesc),
    CreateFramebuffer(FramebufferId, String),
    Attach {
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        image: Option<AttachedImage>,
    },
    SetDrawBuffers(FramebufferId, Vec<AttachmentPoint>),
    Blit {
        src: FramebufferId,
        dst: FramebufferId,
        width: u32,
        height: u32,
        source: BlitSource,
    },
    UploadMesh(MeshId, String),
    CreateProgram(ProgramId, String),
    BindFramebuffer(FramebufferTarget),
    Viewport(u32, u32),
    DepthTest(bool),
    DepthFunc(DepthFunc),
    ClearColor([f32; 4]),
    Clear(FramebufferTarget, ClearFlags),
    ColorMask(u8, bool),
    BindTexture(u32, TextureId),
    UseProgram(ProgramId),
    SetUniform(ProgramId, String, UniformValue),
    Draw {
        program: Option<ProgramId>,
        target: FramebufferTarget,
        mesh: MeshId,
    },
    ResizeScreen(u32, u32),
    EndFrame,
    Release(ResourceId),
}

#[derive(Clone, Debug, Default)]
struct FramebufferState {
    label: String,
    attachments: BTreeMap<AttachmentPoint, AttachedImage>,
    draw_buffers: Vec<AttachmentPoint>,
}

#[derive(Debug)]
pub struct RecordingDevice {
    clip: ClipSpace,
    next_id: u64,
    commands: Vec<Command>,
    release: ReleaseQueue,
    textures: HashMap<TextureId, TextureDesc>,
    render_buffers: HashMap<RenderBufferId, RenderBufferDesc>,
    framebuffers: HashMap<FramebufferId, FramebufferState>,
    meshes: HashMap<MeshId, String>,
    programs: HashMap<ProgramId, ProgramSource>,
    uniforms: HashMap<(ProgramId, String), UniformValue>,
    undeclared: HashSet<(ProgramId, String)>,
    bound: FramebufferTarget,
    program: Option<ProgramId>,
    slots: BTreeMap<u32, TextureId>,
    screen: (u32, u32),
    frames: u64,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_clip_space(ClipSpace::ZeroToOne)
    }

    pub fn with_clip_space(clip: ClipSpace) -> Self {
        Self {
            clip,
            next_id: 1,
            commands: Vec::new(),
            release: ReleaseQueue::new(),
            textures: HashMap::new(),
            render_buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            uniforms: HashMap::new(),
            undeclared: HashSet::new(),
            bound: FramebufferTarget::Default,
            program: None,
            slots: BTreeMap::new(),
            screen: (0, 0),
            frames: 0,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forgets the command log, keeps all device state.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Hands out the command log recorded so far and starts a fresh one.
    /// Long running captures drain it once per frame.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    /// Live texture with `label`, newest first when several share it.
    pub fn texture_by_label(&self, label: &str) -> Option<(TextureId, &TextureDesc)> {
        self.textures
            .iter()
            .filter(|(_, desc)| desc.label == label)
            .max_by_key(|(id, _)| **id)
            .map(|(id, desc)| (*id, desc))
    }

    pub fn render_buffer(&self, id: RenderBufferId) -> Option<&RenderBufferDesc> {
        self.render_buffers.get(&id)
    }

    pub fn framebuffer_label(&self, id: FramebufferId) -> Option<&str> {
        self.framebuffers.get(&id).map(|fb| fb.label.as_str())
    }

    pub fn framebuffer_by_label(&self, label: &str) -> Option<FramebufferId> {
        self.framebuffers
            .iter()
            .find(|(_, fb)| fb.label == label)
            .map(|(id, _)| *id)
    }

    pub fn program_by_label(&self, label: &str) -> Option<ProgramId> {
        self.programs
            .iter()
            .find(|(_, p)| p.label == label)
            .map(|(id, _)| *id)
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id).map(|p| p.label.as_str())
    }

    /// Current value of a uniform, as a shader would see it.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.uniforms.get(&(program, name.to_string())).copied()
    }

    /// Uniform writes to names the program never declared.
    pub fn undeclared_uniforms(&self) -> Vec<(String, String)> {
        let mut names: Vec<_> = self
            .undeclared
            .iter()
            .map(|(program, name)| {
                let label = self.program_label(*program).unwrap_or("?").to_string();
                (label, name.clone())
            })
            .collect();
        names.sort();
        names
    }

    pub fn bound_framebuffer(&self) -> FramebufferTarget {
        self.bound
    }

    pub fn bound_texture(&self, slot: u32) -> Option<TextureId> {
        self.slots.get(&slot).copied()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_resources(&self) -> usize {
        self.textures.len()
            + self.render_buffers.len()
            + self.framebuffers.len()
            + self.meshes.len()
            + self.programs.len()
    }

    pub fn draws(&self) -> impl Iterator<Item = (Option<ProgramId>, FramebufferTarget, MeshId)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw { program, target, mesh } => Some((*program, *target, *mesh)),
            _ => None,
        })
    }

    pub fn draw_count(&self, program: ProgramId) -> usize {
        self.draws().filter(|(p, _, _)| *p == Some(program)).count()
    }

    /// Released objects in the order they were freed.
    pub fn released(&self) -> Vec<ResourceId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Release(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn image_info(&self, image: &AttachedImage) -> Option<AttachedImageInfo> {
        match image {
            AttachedImage::Texture { id, layer, mip } => {
                let desc = self.textures.get(id)?;
                if *layer >= desc.dimension.layers() || *mip >= desc.mip_levels {
                    return None;
                }
                let (width, height) = desc.mip_extent(*mip);
                Some(AttachedImageInfo {
                    width,
                    height,
                    samples: desc.samples,
                    format: desc.format,
                })
            }
            AttachedImage::RenderBuffer(id) => {
                let desc = self.render_buffers.get(id)?;
                Some(AttachedImageInfo {
                    width: desc.width,
                    height: desc.height,
                    samples: desc.samples,
                    format: desc.format,
                })
            }
        }
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for RecordingDevice {
    fn clip_space(&self) -> ClipSpace {
        self.clip
    }

    fn releaser(&self) -> Releaser {
        self.release.releaser()
    }

    fn maintain(&mut self) {
        for id in self.release.drain_reverse_creation() {
            match id {
                ResourceId::Texture(t) => {
                    self.textures.remove(&t);
                    self.slots.retain(|_, bound| *bound != t);
                }
                ResourceId::RenderBuffer(r) => {
                    self.render_buffers.remove(&r);
                }
                ResourceId::Framebuffer(f) => {
                    self.framebuffers.remove(&f);
                    if self.bound == FramebufferTarget::Offscreen(f) {
                        self.bound = FramebufferTarget::Default;
                    }
                }
                ResourceId::Mesh(m) => {
                    self.meshes.remove(&m);
                }
                ResourceId::Program(p) => {
                    self.programs.remove(&p);
                    if self.program == Some(p) {
                        self.program = None;
                    }
                }
            }
            self.commands.push(Command::Release(id));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.next());
        self.textures.insert(id, desc.clone());
        self.commands.push(Command::CreateTexture(id, desc.clone()));
        id
    }

    fn resize_texture(&mut self, id: TextureId, desc: &TextureDesc) {
        if let Some(existing) = self.textures.get_mut(&id) {
            *existing = desc.clone();
            self.commands.push(Command::ResizeTexture(id, desc.clone()));
        } else {
            log::warn!("Resize of unknown texture {id:?}");
        }
    }

    fn upload_texture(&mut self, id: TextureId, layer: u32, mip: u32, image: &ImageData) {
        self.commands.push(Command::UploadTexture {
            texture: id,
            layer,
            mip,
            width: image.width(),
            height: image.height(),
        });
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> RenderBufferId {
        let id = RenderBufferId(self.next());
        self.render_buffers.insert(id, desc.clone());
        self.commands.push(Command::CreateRenderBuffer(id, desc.clone()));
        id
    }

    fn resize_render_buffer(&mut self, id: RenderBufferId, desc: &RenderBufferDesc) {
        if let Some(existing) = self.render_buffers.get_mut(&id) {
            *existing = desc.clone();
            self.commands.push(Command::ResizeRenderBuffer(id, desc.clone()));
        } else {
            log::warn!("Resize of unknown render buffer {id:?}");
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(
            id,
            FramebufferState {
                label: label.to_string(),
                ..Default::default()
            },
        );
        self.commands.push(Command::CreateFramebuffer(id, label.to_string()));
        id
    }

    fn attach(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, image: Option<AttachedImage>) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            match image {
                Some(image) => fb.attachments.insert(point, image),
                None => fb.attachments.remove(&point),
            };
        }
        self.commands.push(Command::Attach {
            framebuffer,
            point,
            image,
        });
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[AttachmentPoint]) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.draw_buffers = buffers.to_vec();
        }
        self.commands
            .push(Command::SetDrawBuffers(framebuffer, buffers.to_vec()));
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Unsupported(format!("unknown framebuffer {}", framebuffer.0));
        };
        check_completeness(
            fb.attachments
                .iter()
                .map(|(point, image)| (*point, self.image_info(image))),
            &fb.draw_buffers,
        )
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, width: u32, height: u32, source: BlitSource) {
        self.commands.push(Command::Blit {
            src,
            dst,
            width,
            height,
            source,
        });
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> MeshId {
        let id = MeshId(self.next());
        self.meshes.insert(id, mesh.label.clone());
        self.commands.push(Command::UploadMesh(id, mesh.label.clone()));
        id
    }

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramId> {
        let id = ProgramId(self.next());
        self.programs.insert(id, source.clone());
        self.commands
            .push(Command::CreateProgram(id, source.label.clone()));
        Ok(id)
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget) {
        self.bound = target;
        self.commands.push(Command::BindFramebuffer(target));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.commands.push(Command::Viewport(width, height));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.commands.push(Command::DepthTest(enabled));
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.commands.push(Command::DepthFunc(func));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.commands.push(Command::ClearColor(color));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.commands.push(Command::Clear(self.bound, flags));
    }

    fn color_mask(&mut self, attachment: u8, enabled: bool) {
        self.commands.push(Command::ColorMask(attachment, enabled));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.slots.insert(slot, texture);
        self.commands.push(Command::BindTexture(slot, texture));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        if let Some(source) = self.programs.get(&program) {
            match source.uniforms.iter().find(|u| u.name == name) {
                Some(decl) if decl.kind != value.kind() => log::warn!(
                    "Uniform {name} of {} is {:?}, got {:?}",
                    source.label,
                    decl.kind,
                    value.kind()
                ),
                Some(_) => (),
                None => {
                    self.undeclared.insert((program, name.to_string()));
                }
            }
        }
        self.uniforms.insert((program, name.to_string()), value);
        self.commands
            .push(Command::SetUniform(program, name.to_string(), value));
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        self.commands.push(Command::Draw {
            program: self.program,
            target: self.bound,
            mesh,
        });
    }

    fn resize_screen(&mut self, width: u32, height: u32) {
        self.screen = (width, height);
        self.commands.push(Command::ResizeScreen(width, height));
    }

    fn end_frame(&mut self) {
        self.frames += 1;
        self.commands.push(Command::EndFrame);
    }
}
