//! Full data flow: estimate -> controller -> sinks -> stage reconfiguration.

use std::{sync::Arc, time::Duration};

use vireo::{
    AdaptiveBitrateSink, FrameRateSink, FrameRateSwitch,
    bandwidth::{BandwidthController, ControllerOptions, Priority, SharedEstimate},
    pipeline::{AdaptiveStage, Stage, StageBuilder, UpdateConfig, testing::ScriptedStageBuilder},
};

const INTERVAL: Duration = Duration::from_millis(200);

async fn run_ticks(n: u32) {
    tokio::time::sleep(INTERVAL * n + Duration::from_millis(1)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn adaptive_stage(initial: u64) -> Arc<AdaptiveStage<ScriptedStageBuilder>> {
    Arc::new(
        AdaptiveStage::new(
            UpdateConfig::new(0, 10_000_000, 0).unwrap(),
            ScriptedStageBuilder::new(initial, 1),
        )
        .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn shares_drive_encoder_bitrate_and_filter_frame_rate() {
    let controller = Arc::new(BandwidthController::new(ControllerOptions {
        interval: INTERVAL,
    }));
    let estimate = Arc::new(SharedEstimate::new());
    estimate.publish(2_000_000);
    controller.attach_estimator(estimate.clone());

    let video = adaptive_stage(500_000);
    let preview = adaptive_stage(30);

    controller
        .subscribe(
            "video",
            Priority::LEVEL3,
            Arc::new(AdaptiveBitrateSink::new(Arc::clone(&video))),
        )
        .unwrap();
    controller
        .subscribe(
            "preview",
            Priority::LEVEL1,
            Arc::new(FrameRateSink::new(
                Arc::clone(&preview),
                FrameRateSwitch {
                    switch_limit_bps: 1_000_000,
                    low_fps: 15,
                    high_fps: 30,
                },
            )),
        )
        .unwrap();

    controller.start().unwrap();
    run_ticks(1).await;

    // 2_000_000 split 3:1.
    assert_eq!(video.builder().current_target().unwrap(), 1_500_000);
    assert_eq!(preview.builder().current_target().unwrap(), 15);

    // Bandwidth recovers; the preview's share crosses the switch limit.
    estimate.publish(8_000_000);
    run_ticks(1).await;

    assert_eq!(video.builder().current_target().unwrap(), 6_000_000);
    assert_eq!(preview.builder().current_target().unwrap(), 30);

    controller.close();
    video.close();
    preview.close();
}

#[tokio::test(start_paused = true)]
async fn closed_stage_is_dropped_from_distribution() {
    let controller = Arc::new(BandwidthController::new(ControllerOptions {
        interval: INTERVAL,
    }));
    let estimate = Arc::new(SharedEstimate::new());
    estimate.publish(1_200_000);
    controller.attach_estimator(estimate);

    let video = adaptive_stage(500_000);
    let doomed = adaptive_stage(500_000);

    controller
        .subscribe(
            "video",
            Priority::LEVEL1,
            Arc::new(AdaptiveBitrateSink::new(Arc::clone(&video))),
        )
        .unwrap();
    controller
        .subscribe(
            "doomed",
            Priority::LEVEL1,
            Arc::new(AdaptiveBitrateSink::new(Arc::clone(&doomed))),
        )
        .unwrap();
    controller.start().unwrap();

    run_ticks(1).await;
    assert_eq!(video.builder().current_target().unwrap(), 600_000);

    // Its sink now fails, so the controller unsubscribes it and the
    // survivor absorbs the whole estimate.
    doomed.close();
    run_ticks(2).await;

    assert_eq!(video.builder().current_target().unwrap(), 1_200_000);
    controller.close();
    video.close();
}
