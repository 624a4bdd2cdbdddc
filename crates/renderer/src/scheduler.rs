//! Frame scheduling over [`MAX_FRAMES_IN_FLIGHT`] slots.
//!
//! [`FrameScheduler`] owns the per-tick ordering and the recreation policy;
//! everything that touches the GPU goes through a [`FrameBackend`]. Each
//! tick runs:
//!
//! ```text
//! wait(slot fence) -> acquire -> reset(slot fence) -> update uniforms
//!     -> record + submit -> present -> advance slot
//! ```
//!
//! An out-of-date acquire recreates the presentation targets and returns
//! without advancing the slot or touching its fence. A stale present, or a
//! resize reported by the window, recreates after the slot has advanced.
//! Recreation is deferred while the framebuffer has zero area.

use ash::vk;
use tracing::{debug, info, trace};

use vkforge_platform::FramebufferSource;
use vkforge_rhi::swapchain::AcquiredImage;
use vkforge_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;

/// GPU-facing half of the frame loop.
///
/// `slot` is always in `0..MAX_FRAMES_IN_FLIGHT`.
pub trait FrameBackend {
    /// Blocks until the last submission made from `slot` has retired.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next presentable image, signaling the slot's
    /// image-acquired semaphore.
    ///
    /// Returns [`RhiError::PresentationStale`] when the chain is out of date.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage>;

    /// Returns the slot's fence to the unsignaled state.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Writes the slot's uniform buffer for time `elapsed_secs`.
    fn update_uniforms(&mut self, slot: usize, elapsed_secs: f32) -> RhiResult<()>;

    /// Records the slot's command buffer against `image_index` and submits
    /// it, signaling the slot's fence on completion.
    fn record_and_submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Presents `image_index` once the slot's rendering has finished.
    ///
    /// Returns [`RhiError::PresentationStale`] when the chain is out of date
    /// or suboptimal.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Destroys the chain and everything sized to it.
    fn destroy_presentation(&mut self);

    /// Creates the chain and its dependents for a framebuffer of the given
    /// size. Returns the extent actually chosen.
    fn create_presentation(&mut self, framebuffer: vk::Extent2D) -> RhiResult<vk::Extent2D>;
}

/// Outcome of one [`FrameScheduler::draw_frame`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and presented.
    Rendered,
    /// The presentation targets were rebuilt this tick.
    Recreated,
    /// The framebuffer has zero area; nothing was rendered and recreation
    /// is pending until a non-zero size is reported.
    Suspended,
}

/// Drives a [`FrameBackend`] through the per-frame protocol.
pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    current_slot: usize,
    extent: vk::Extent2D,
    resize_requested: bool,
    recreate_pending: bool,
    frames_submitted: u64,
    recreations: u64,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Wraps a backend whose presentation targets already exist at `extent`.
    pub fn new(backend: B, extent: vk::Extent2D) -> Self {
        Self {
            backend,
            current_slot: 0,
            extent,
            resize_requested: false,
            recreate_pending: false,
            frames_submitted: 0,
            recreations: 0,
        }
    }

    /// Records that the window was resized; honored after the next present.
    pub fn notify_resized(&mut self) {
        self.resize_requested = true;
    }

    /// Runs one tick of the frame loop.
    ///
    /// # Errors
    ///
    /// Every error except [`RhiError::PresentationStale`] is fatal and is
    /// returned unchanged; staleness is handled here by recreation.
    pub fn draw_frame(
        &mut self,
        window: &impl FramebufferSource,
        elapsed_secs: f32,
    ) -> RhiResult<FrameStatus> {
        if self.recreate_pending && !self.recreate(window)? {
            return Ok(FrameStatus::Suspended);
        }

        let slot = self.current_slot;
        self.backend.wait_for_slot(slot)?;

        let image = match self.backend.acquire_image(slot) {
            Ok(image) => image,
            Err(RhiError::PresentationStale) => {
                debug!("Presentation chain out of date on acquire (slot {})", slot);
                return self.recreate_status(window);
            }
            Err(e) => return Err(e),
        };

        // Work is guaranteed to be submitted from here on
        self.backend.reset_slot(slot)?;
        self.backend.update_uniforms(slot, elapsed_secs)?;
        self.backend.record_and_submit(slot, image.index)?;
        self.frames_submitted += 1;
        trace!("Submitted frame {} from slot {}", self.frames_submitted, slot);

        let stale = match self.backend.present(slot, image.index) {
            Ok(()) => false,
            Err(RhiError::PresentationStale) => true,
            Err(e) => return Err(e),
        };

        self.current_slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        if stale || self.resize_requested {
            debug!(
                "Recreating after present (stale: {}, resized: {})",
                stale, self.resize_requested
            );
            self.resize_requested = false;
            return self.recreate_status(window);
        }

        Ok(FrameStatus::Rendered)
    }

    fn recreate_status(&mut self, window: &impl FramebufferSource) -> RhiResult<FrameStatus> {
        if self.recreate(window)? {
            Ok(FrameStatus::Recreated)
        } else {
            Ok(FrameStatus::Suspended)
        }
    }

    /// Rebuilds the presentation targets at the window's current size.
    ///
    /// Returns `false` and leaves the request pending when the framebuffer
    /// has zero area.
    fn recreate(&mut self, window: &impl FramebufferSource) -> RhiResult<bool> {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            if !self.recreate_pending {
                debug!("Framebuffer has zero area, deferring recreation");
            }
            self.recreate_pending = true;
            return Ok(false);
        }

        self.backend.wait_idle()?;
        self.backend.destroy_presentation();
        self.extent = self
            .backend
            .create_presentation(vk::Extent2D { width, height })?;

        self.recreate_pending = false;
        self.recreations += 1;
        info!(
            "Presentation recreated at {}x{} (recreation #{})",
            self.extent.width, self.extent.height, self.recreations
        );
        Ok(true)
    }

    /// Waits for all submitted work, e.g. before teardown.
    pub fn wait_idle(&mut self) -> RhiResult<()> {
        self.backend.wait_idle()
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.recreate_pending
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    #[inline]
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;

    use vkforge_rhi::swapchain::choose_extent;

    use super::*;

    const IMAGES_PER_CHAIN: usize = 3;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        /// Submitted work the simulated GPU has not retired yet.
        Pending { frame: u64 },
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Wait { slot: usize, retired: Option<u64> },
        Acquire(usize),
        Reset(usize),
        Update(usize),
        Submit { slot: usize, frame: u64 },
        Present(usize),
        WaitIdle,
        Destroy(vk::Extent2D),
        Create(vk::Extent2D),
    }

    struct MockChain {
        extent: vk::Extent2D,
        next_image: u32,
    }

    /// Simulated GPU with scripted acquire/present results.
    struct MockBackend {
        fences: [FenceState; MAX_FRAMES_IN_FLIGHT],
        calls: Vec<Call>,
        chain: Option<MockChain>,
        live_images: usize,
        surface_extent: vk::Extent2D,
        acquire_results: VecDeque<RhiResult<()>>,
        present_results: VecDeque<RhiResult<()>>,
        submitted: u64,
    }

    impl MockBackend {
        fn new(extent: vk::Extent2D) -> Self {
            Self {
                fences: [FenceState::Signaled; MAX_FRAMES_IN_FLIGHT],
                calls: Vec::new(),
                chain: Some(MockChain {
                    extent,
                    next_image: 0,
                }),
                live_images: IMAGES_PER_CHAIN,
                surface_extent: extent,
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                submitted: 0,
            }
        }

        fn chain_extent(&self) -> Option<vk::Extent2D> {
            self.chain.as_ref().map(|c| c.extent)
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
            let retired = match self.fences[slot] {
                FenceState::Signaled => None,
                FenceState::Pending { frame } => Some(frame),
                // A reset fence with no submission behind it never signals
                FenceState::Unsignaled => return Err(RhiError::DeviceLost("fence")),
            };
            self.fences[slot] = FenceState::Signaled;
            self.calls.push(Call::Wait { slot, retired });
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
            self.calls.push(Call::Acquire(slot));
            if let Some(result) = self.acquire_results.pop_front() {
                result?;
            }
            let chain = self.chain.as_mut().expect("acquire without a chain");
            let index = chain.next_image;
            chain.next_image = (index + 1) % IMAGES_PER_CHAIN as u32;
            Ok(AcquiredImage {
                index,
                suboptimal: false,
            })
        }

        fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
            assert_eq!(
                self.fences[slot],
                FenceState::Signaled,
                "reset of a fence that is not signaled"
            );
            self.fences[slot] = FenceState::Unsignaled;
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn update_uniforms(&mut self, slot: usize, _elapsed_secs: f32) -> RhiResult<()> {
            self.calls.push(Call::Update(slot));
            Ok(())
        }

        fn record_and_submit(&mut self, slot: usize, _image_index: u32) -> RhiResult<()> {
            assert_eq!(
                self.fences[slot],
                FenceState::Unsignaled,
                "recording into a slot whose previous work may be in flight"
            );
            self.submitted += 1;
            self.fences[slot] = FenceState::Pending {
                frame: self.submitted,
            };
            self.calls.push(Call::Submit {
                slot,
                frame: self.submitted,
            });
            Ok(())
        }

        fn present(&mut self, slot: usize, _image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Present(slot));
            self.present_results.pop_front().unwrap_or(Ok(()))
        }

        fn wait_idle(&mut self) -> RhiResult<()> {
            for fence in &mut self.fences {
                if let FenceState::Pending { .. } = fence {
                    *fence = FenceState::Signaled;
                }
            }
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn destroy_presentation(&mut self) {
            let chain = self.chain.take().expect("destroy without a chain");
            self.live_images -= IMAGES_PER_CHAIN;
            self.calls.push(Call::Destroy(chain.extent));
        }

        fn create_presentation(&mut self, framebuffer: vk::Extent2D) -> RhiResult<vk::Extent2D> {
            assert!(
                self.chain.is_none(),
                "new chain created while the old one is alive"
            );
            let capabilities = vk::SurfaceCapabilitiesKHR {
                current_extent: self.surface_extent,
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                ..Default::default()
            };
            let extent = choose_extent(&capabilities, framebuffer);
            self.chain = Some(MockChain {
                extent,
                next_image: 0,
            });
            self.live_images += IMAGES_PER_CHAIN;
            self.calls.push(Call::Create(extent));
            Ok(extent)
        }
    }

    struct MockWindow {
        size: Cell<(u32, u32)>,
    }

    impl MockWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: Cell::new((width, height)),
            }
        }
    }

    impl FramebufferSource for MockWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.size.get()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn scheduler() -> FrameScheduler<MockBackend> {
        FrameScheduler::new(MockBackend::new(extent(800, 600)), extent(800, 600))
    }

    #[test]
    fn test_max_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_steady_state_call_order() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Rendered
        );
        assert_eq!(
            scheduler.backend().calls,
            vec![
                Call::Wait {
                    slot: 0,
                    retired: None
                },
                Call::Acquire(0),
                Call::Reset(0),
                Call::Update(0),
                Call::Submit { slot: 0, frame: 1 },
                Call::Present(0),
            ]
        );
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn test_slot_fence_gates_recording() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);

        for _ in 0..10 {
            scheduler.draw_frame(&window, 0.0).unwrap();
        }
        assert_eq!(scheduler.frames_submitted(), 10);

        // Frame k + 2 reuses frame k's slot: its submit must come after a
        // wait that retired frame k.
        let calls = &scheduler.backend().calls;
        for (i, call) in calls.iter().enumerate() {
            let Call::Submit { slot, frame } = *call else {
                continue;
            };
            assert_eq!(slot, ((frame - 1) % MAX_FRAMES_IN_FLIGHT as u64) as usize);
            if frame <= MAX_FRAMES_IN_FLIGHT as u64 {
                continue;
            }
            let previous = frame - MAX_FRAMES_IN_FLIGHT as u64;
            let retired_at = calls
                .iter()
                .position(|c| {
                    *c == Call::Wait {
                        slot,
                        retired: Some(previous),
                    }
                })
                .expect("previous frame on this slot never retired");
            assert!(retired_at < i, "frame {} recorded before frame {} retired", frame, previous);
        }
    }

    #[test]
    fn test_out_of_date_acquire_keeps_slot_and_fence() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);

        scheduler.draw_frame(&window, 0.0).unwrap();
        scheduler.backend_mut().calls.clear();
        scheduler
            .backend_mut()
            .acquire_results
            .push_back(Err(RhiError::PresentationStale));

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Recreated
        );
        assert_eq!(scheduler.current_slot(), 1);
        assert_eq!(scheduler.backend().count(|c| matches!(c, Call::Reset(_))), 0);
        assert_eq!(scheduler.backend().count(|c| matches!(c, Call::Submit { .. })), 0);

        // The slot's fence was left signaled, so the next tick does not hang
        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Rendered
        );
        assert_eq!(scheduler.current_slot(), 0);
    }

    #[test]
    fn test_resize_on_out_of_date_acquire() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);

        scheduler.draw_frame(&window, 0.0).unwrap();
        assert_eq!(scheduler.backend().chain_extent(), Some(extent(800, 600)));

        window.size.set((1024, 768));
        scheduler.backend_mut().surface_extent = extent(1024, 768);
        scheduler
            .backend_mut()
            .acquire_results
            .push_back(Err(RhiError::PresentationStale));

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Recreated
        );
        assert_eq!(scheduler.extent(), extent(1024, 768));
        assert_eq!(scheduler.backend().chain_extent(), Some(extent(1024, 768)));
        assert_eq!(scheduler.backend().live_images, IMAGES_PER_CHAIN);

        let calls = &scheduler.backend().calls;
        let idle = calls.iter().rposition(|c| *c == Call::WaitIdle).unwrap();
        let destroy = calls
            .iter()
            .position(|c| *c == Call::Destroy(extent(800, 600)))
            .unwrap();
        let create = calls
            .iter()
            .position(|c| *c == Call::Create(extent(1024, 768)))
            .unwrap();
        assert!(idle < destroy && destroy < create);
    }

    #[test]
    fn test_extent_from_framebuffer_when_surface_is_undefined() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(1280, 720);
        scheduler.backend_mut().surface_extent = extent(u32::MAX, u32::MAX);
        scheduler.notify_resized();

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Recreated
        );
        assert_eq!(scheduler.extent(), extent(1280, 720));
    }

    #[test]
    fn test_stale_present_recreates_after_advancing() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);
        scheduler
            .backend_mut()
            .present_results
            .push_back(Err(RhiError::PresentationStale));

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Recreated
        );
        assert_eq!(scheduler.current_slot(), 1);
        assert_eq!(scheduler.frames_submitted(), 1);
        assert_eq!(scheduler.recreations(), 1);
    }

    #[test]
    fn test_resize_flag_recreates_once() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);

        scheduler.notify_resized();
        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Recreated
        );
        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Rendered
        );
        assert_eq!(scheduler.recreations(), 1);
    }

    #[test]
    fn test_zero_area_defers_recreation() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);
        scheduler.draw_frame(&window, 0.0).unwrap();

        window.size.set((0, 0));
        scheduler
            .backend_mut()
            .acquire_results
            .push_back(Err(RhiError::PresentationStale));

        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Suspended
        );
        assert!(scheduler.is_suspended());
        // The old chain is kept until a usable size arrives
        assert_eq!(scheduler.backend().chain_extent(), Some(extent(800, 600)));

        let acquires = scheduler.backend().count(|c| matches!(c, Call::Acquire(_)));
        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Suspended
        );
        assert_eq!(
            scheduler.backend().count(|c| matches!(c, Call::Acquire(_))),
            acquires
        );

        window.size.set((640, 480));
        scheduler.backend_mut().surface_extent = extent(640, 480);
        assert_eq!(
            scheduler.draw_frame(&window, 0.0).unwrap(),
            FrameStatus::Rendered
        );
        assert!(!scheduler.is_suspended());
        assert_eq!(scheduler.extent(), extent(640, 480));
        assert_eq!(scheduler.backend().live_images, IMAGES_PER_CHAIN);
    }

    #[test]
    fn test_fatal_errors_propagate() {
        let mut scheduler = scheduler();
        let window = MockWindow::new(800, 600);
        scheduler
            .backend_mut()
            .acquire_results
            .push_back(Err(RhiError::DeviceLost("swapchain image")));

        assert!(matches!(
            scheduler.draw_frame(&window, 0.0),
            Err(RhiError::DeviceLost(_))
        ));
        assert_eq!(scheduler.recreations(), 0);

        scheduler
            .backend_mut()
            .present_results
            .push_back(Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(
            scheduler.draw_frame(&window, 0.0),
            Err(RhiError::VulkanError(_))
        ));
    }
}
