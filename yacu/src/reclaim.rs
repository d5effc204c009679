//! Removal of images the batch left without containers.

use crate::image::ImageSet;
use crate::notify::Notifications;
use crate::runtime::{ContainerFilter, ContainerRuntime};
use crate::util::id_encoded;

/// Force-remove every image in `images` that no container references.
/// Returns how many were removed.
pub async fn reclaim_images(
    runtime: &dyn ContainerRuntime,
    notifications: &Notifications,
    images: ImageSet,
) -> usize {
    let containers = match runtime.list_containers(&ContainerFilter::all()).await {
        Ok(containers) => containers,
        Err(e) => {
            tracing::error!(error = %e, "Listing containers failed, keeping images");
            return 0;
        }
    };

    let mut removed = 0;
    for image in images.into_images() {
        let in_use = containers
            .iter()
            .any(|c| id_encoded(&c.image_id) == id_encoded(&image.id));
        if in_use {
            tracing::debug!(id = %image.id, "Image still in use");
            continue;
        }

        tracing::debug!(id = %image.id, "Removing unused image");
        match runtime.remove_image(&image.id, true).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::error!(id = %image.id, error = %e, "Removing image failed");
                notifications.image_removal_failed(&image, &e).await;
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageRecord;
    use crate::notify::Gates;
    use crate::runtime::ImageDetails;
    use crate::testing::{Event, FakeRuntime, RecordingNotifier, container_details};
    use chrono::Utc;

    async fn image(runtime: &FakeRuntime, id: &str) -> ImageRecord {
        let details = runtime.inspect_image(id).await.unwrap();
        ImageRecord::new(details, crate::image::TaggedReference::parse("app:1").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_removes_only_unreferenced_images() {
        let runtime = FakeRuntime::new();
        runtime.add_container(container_details("a", "keep", "keep:1"), Utc::now(), &[]);
        runtime.add_container(container_details("b", "gone", "gone:1"), Utc::now(), &[]);
        runtime.add_container(container_details("c", "broken", "broken:1"), Utc::now(), &[]);
        let keep = image(&runtime, "keep:1").await;
        let gone = image(&runtime, "gone:1").await;
        let broken = image(&runtime, "broken:1").await;
        runtime.remove_container("b", true, false).await.unwrap();
        runtime.remove_container("c", true, false).await.unwrap();
        runtime.fail("remove_image", &broken.id);

        let notifier = RecordingNotifier::new();
        let mut notifications = Notifications::new();
        notifications.add(Box::new(notifier.clone()), Gates::all());

        let mut set = ImageSet::new();
        for image in [keep.clone(), gone.clone(), broken.clone()] {
            set.add(image);
        }
        let removed = reclaim_images(&runtime, &notifications, set).await;

        assert_eq!(removed, 1);
        assert!(runtime.has_image(&keep.id));
        assert!(!runtime.has_image(&gone.id));
        assert!(runtime.has_image(&broken.id));
        assert_eq!(
            notifier.events(),
            vec![Event::ImageRemovalFailed { id: broken.id }]
        );
    }

    #[tokio::test]
    async fn test_list_failure_removes_nothing() {
        let runtime = FakeRuntime::new();
        runtime.fail("list", "*");
        let mut set = ImageSet::new();
        set.add(ImageRecord::new(
            ImageDetails {
                id: "sha256:x".into(),
                created: Utc::now().to_rfc3339(),
                repo_digests: vec![],
            },
            crate::image::TaggedReference::parse("app:1").unwrap(),
        )
        .unwrap());

        let removed = reclaim_images(&runtime, &Notifications::new(), set).await;
        assert_eq!(removed, 0);
        assert!(runtime.calls().is_empty());
    }
}
