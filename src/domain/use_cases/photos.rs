use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    constants::MAX_VIDEO_BYTES,
    date_grouping::{DateGroupingEngine, DateKey},
    entities::{
        activity_log::ActivityAction,
        album::clean_album_name,
        comment::NewComment,
        photo::{find_duplicates, DuplicatePhoto, Photo, PhotoPatch},
    },
    errors::{AppError, MediaError},
    infrastructure::{
        media::{metadata, urls, MediaFile, MediaKind, MediaRemover, MediaUploader},
        utils::ids::{name_base, now_millis, photo_id},
    },
    repositories::gateway::PersistenceGateway,
};

pub struct UploadRequest {
    pub file: MediaFile,
    pub uploader: String,
    /// Day chosen by the user, overriding any date found in the file.
    pub date_override: Option<DateKey>,
}

pub struct PhotoHandler<U, R>
where
    U: MediaUploader,
    R: MediaRemover,
{
    pub gateway: Arc<PersistenceGateway>,
    pub engine: DateGroupingEngine,
    pub uploader: U,
    pub remover: R,
}

impl<U, R> PhotoHandler<U, R>
where
    U: MediaUploader,
    R: MediaRemover,
{
    pub fn new(gateway: Arc<PersistenceGateway>, engine: DateGroupingEngine, uploader: U, remover: R) -> Self {
        PhotoHandler { gateway, engine, uploader, remover }
    }

    /// Day a new upload is grouped under: the override, else the EXIF
    /// capture date, else the file's modification time, else today.
    pub fn capture_date(&self, file: &MediaFile, kind: MediaKind, date_override: Option<DateKey>) -> Result<DateKey, AppError> {
        if let Some(date) = date_override {
            return Ok(date);
        }
        if kind == MediaKind::Image {
            if let Some(taken) = metadata::capture_datetime(&file.bytes) {
                // EXIF times carry no zone and are already camera-local.
                return Ok(DateKey::new(taken.date())?);
            }
        }
        match &file.modified_at {
            Some(modified) => Ok(self.engine.date_key_for(modified)?),
            None => Ok(self.engine.today()?),
        }
    }

    #[tracing::instrument(skip(self, request), fields(file = %request.file.file_name, uploader = %request.uploader))]
    pub async fn upload(&self, request: UploadRequest) -> Result<Photo, AppError> {
        let UploadRequest { file, uploader, date_override } = request;

        if file.bytes.is_empty() {
            return Err(AppError::InvalidInput(format!("{} is empty", file.file_name)));
        }
        let kind = file.kind();
        if kind == MediaKind::Video && file.size() > MAX_VIDEO_BYTES {
            return Err(MediaError::TooLarge {
                kind: "Video".to_string(),
                limit_mb: MAX_VIDEO_BYTES / (1024 * 1024),
            }
            .into());
        }

        let date_group = self.capture_date(&file, kind, date_override)?;
        let url = self.uploader.upload(&file, kind, &date_group.folder()).await?;

        let millis = now_millis();
        let mut photo = Photo {
            doc_id: None,
            id: photo_id(&file.file_name, millis),
            url,
            uploaded_at: Utc::now(),
            date_group: Some(date_group),
            uploader: uploader.clone(),
            timestamp: millis,
            name_base: name_base(&file.file_name),
            original_file_name: file.file_name.clone(),
            file_size: file.size(),
            reactions: Default::default(),
            albums: Default::default(),
            duration: None,
            comment_count: Some(0),
        };

        let stored_id = self.gateway.create_photo(&photo).await?;
        if stored_id != photo.id {
            photo.doc_id = Some(stored_id);
        }
        tracing::info!("Saved {} under {}", photo.original_file_name, date_group);

        let details = json!({
            "photoId": photo.id,
            "fileName": photo.original_file_name,
            "timestamp": millis,
        });
        if let Err(e) = self.gateway.save_activity_log(ActivityAction::Upload, &uploader, details).await {
            tracing::warn!("Upload activity log failed: {}", e);
        }

        Ok(photo)
    }

    /// Uploads sequentially; one failure does not stop the rest.
    pub async fn upload_many(&self, requests: Vec<UploadRequest>) -> Vec<Result<Photo, AppError>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let name = request.file.file_name.clone();
            let result = self.upload(request).await;
            if let Err(e) = &result {
                tracing::error!("Upload of {} failed: {}", name, e);
            }
            results.push(result);
        }
        results
    }

    /// Removes the CDN asset (best effort), then the photo and its comments.
    pub async fn delete(&self, photo: &Photo) -> Result<(), AppError> {
        if let Some(public_id) = urls::derive_public_id(&photo.url) {
            if let Err(e) = self.remover.delete(&public_id, urls::kind_of_url(&photo.url)).await {
                tracing::warn!("CDN delete of {} failed: {}", public_id, e);
            }
        }
        self.gateway.delete_photo(photo.record_id()).await?;
        Ok(())
    }

    pub async fn delete_many(&self, photos: &[Photo]) -> Vec<(String, Result<(), AppError>)> {
        let mut results = Vec::with_capacity(photos.len());
        for photo in photos {
            results.push((photo.record_id().to_string(), self.delete(photo).await));
        }
        results
    }

    pub async fn toggle_reaction(&self, photo: &Photo, emoji: &str, member: &str) -> Result<Photo, AppError> {
        let mut updated = photo.clone();
        updated.toggle_reaction(emoji, member);
        self.gateway
            .update_photo(photo.record_id(), &PhotoPatch::reactions(updated.reactions.clone()))
            .await?;
        Ok(updated)
    }

    /// Replaces the photo's album memberships, registering unseen album names.
    pub async fn set_albums(&self, photo: &Photo, albums: &[String]) -> Result<Photo, AppError> {
        let albums: BTreeSet<String> = albums.iter().filter_map(|a| clean_album_name(a)).collect();
        for album in albums.difference(&photo.albums) {
            self.gateway.add_album(album).await?;
        }

        self.gateway
            .update_photo(photo.record_id(), &PhotoPatch::albums(albums.clone()))
            .await?;
        Ok(Photo { albums, ..photo.clone() })
    }

    pub async fn duplicates(&self) -> Result<Vec<DuplicatePhoto>, AppError> {
        let photos = self.gateway.fetch_photos().await?;
        Ok(find_duplicates(&photos))
    }

    pub async fn add_comment(&self, photo: &Photo, comment: NewComment) -> Result<String, AppError> {
        comment.validate()?;
        if comment.text.trim().is_empty() {
            return Err(AppError::InvalidInput("Comment text is empty".to_string()));
        }

        let comment = comment.into_comment(now_millis());
        let id = self.gateway.add_comment(photo.record_id(), &comment).await?;

        let details = json!({ "photoId": photo.id, "commentId": id });
        if let Err(e) = self.gateway.save_activity_log(ActivityAction::Comment, &comment.user, details).await {
            tracing::warn!("Comment activity log failed: {}", e);
        }
        Ok(id)
    }

    pub async fn delete_comment(&self, photo: &Photo, comment_id: &str) -> Result<(), AppError> {
        self.gateway.delete_comment(photo.record_id(), comment_id).await?;
        Ok(())
    }
}
