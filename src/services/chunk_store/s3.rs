use super::ChunkStore;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Part};
use bytes::Bytes;
use uuid::Uuid;

const KEY_PREFIX: &str = "uploads";
const KEY_SEPARATOR: char = '|';
const MAX_PARTS: usize = 10_000;

/// Object key and multipart upload id packed into one storage key.
struct MultipartKey<'a> {
    object_key: &'a str,
    upload_id: &'a str,
}

impl<'a> MultipartKey<'a> {
    fn encode(object_key: &str, upload_id: &str) -> String {
        format!("{}{}{}", object_key, KEY_SEPARATOR, upload_id)
    }

    fn parse(storage_key: &'a str) -> Result<Self> {
        // Object keys are generated here and never contain the separator
        storage_key
            .split_once(KEY_SEPARATOR)
            .filter(|(object_key, upload_id)| !object_key.is_empty() && !upload_id.is_empty())
            .map(|(object_key, upload_id)| Self {
                object_key,
                upload_id,
            })
            .ok_or_else(|| anyhow!("Invalid storage key: {}", storage_key))
    }
}

/// Number of the part that starts at `offset`: one past the parts whose sizes
/// sum to exactly `offset`. Any part already stored under that number was
/// never acknowledged and gets overwritten. `None` when the committed parts
/// fall short of `offset` or straddle it.
fn next_part_number(parts: &[Part], offset: u64) -> Option<i32> {
    let mut sized: Vec<(i32, u64)> = parts
        .iter()
        .filter_map(|p| Some((p.part_number()?, p.size()?.max(0) as u64)))
        .collect();
    sized.sort_unstable_by_key(|(number, _)| *number);

    let mut covered = 0u64;
    let mut last = 0;
    for (number, size) in sized {
        if covered == offset {
            break;
        }
        // Part numbers must be contiguous below the committed offset
        if number != last + 1 {
            return None;
        }
        covered += size;
        last = number;
    }
    (covered == offset).then_some(last + 1)
}

/// Chunk store on S3 multipart uploads; each appended chunk becomes one part.
///
/// S3 requires every part except the last to be at least 5 MiB, so clients
/// of this backend must send chunks of at least that size.
pub struct S3ChunkStore {
    client: Client,
    bucket: String,
}

impl S3ChunkStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn reference(&self, object_key: &str) -> String {
        format!("s3://{}/{}", self.bucket, object_key)
    }

    async fn list_all_parts(&self, key: &MultipartKey<'_>) -> Result<Vec<Part>> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let res = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(key.object_key)
                .upload_id(key.upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await?;

            parts.extend(res.parts().iter().cloned());

            if !res.is_truncated().unwrap_or(false) {
                break;
            }
            match res.next_part_number_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        Ok(parts)
    }

    async fn object_exists(&self, object_key: &str) -> bool {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .is_ok()
    }

    async fn complete(&self, key: &MultipartKey<'_>) -> Result<()> {
        let completed_parts: Vec<CompletedPart> = self
            .list_all_parts(key)
            .await?
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .set_e_tag(p.e_tag().map(str::to_string))
                    .set_part_number(p.part_number())
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key.object_key)
            .upload_id(key.upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ChunkStore for S3ChunkStore {
    async fn allocate(&self) -> Result<String> {
        let object_key = format!("{}/{}", KEY_PREFIX, Uuid::new_v4());
        let res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await?;

        let upload_id = res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID for {}", object_key))?;

        Ok(MultipartKey::encode(&object_key, upload_id))
    }

    async fn append(&self, storage_key: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        let key = MultipartKey::parse(storage_key)?;
        let parts = self.list_all_parts(&key).await?;
        let part_number = next_part_number(&parts, offset)
            .ok_or_else(|| anyhow!("Parts of {} do not end at offset {}", key.object_key, offset))?;

        if part_number as usize > MAX_PARTS {
            return Err(anyhow!(
                "Multipart upload {} already has {} parts",
                key.object_key,
                MAX_PARTS
            ));
        }

        let len = chunk.len() as u64;

        let res = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key.object_key)
            .upload_id(key.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(chunk))
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 upload_part failed: key={}/{}, part={}, error={:?}",
                self.bucket,
                key.object_key,
                part_number,
                e
            );
            return Err(e.into());
        }

        Ok(offset + len)
    }

    async fn finalize(&self, storage_key: &str) -> Result<String> {
        let key = MultipartKey::parse(storage_key)?;

        match self.complete(&key).await {
            Ok(()) => Ok(self.reference(key.object_key)),
            Err(e) => {
                // A previous attempt may have completed the upload before failing to report it
                if self.object_exists(key.object_key).await {
                    tracing::info!("Multipart upload {} was already completed", key.object_key);
                    Ok(self.reference(key.object_key))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn abort(&self, storage_key: &str) -> Result<()> {
        let key = MultipartKey::parse(storage_key)?;
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key.object_key)
            .upload_id(key.upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_key_round_trips_through_storage_key() {
        let encoded = MultipartKey::encode("uploads/abc", "id|with|bars");
        let key = MultipartKey::parse(&encoded).unwrap();
        assert_eq!(key.object_key, "uploads/abc");
        assert_eq!(key.upload_id, "id|with|bars");
    }

    fn part(number: i32, size: i64) -> Part {
        Part::builder().part_number(number).size(size).build()
    }

    #[test]
    fn next_part_follows_committed_parts() {
        assert_eq!(next_part_number(&[], 0), Some(1));
        let parts = [part(1, 100), part(2, 50)];
        assert_eq!(next_part_number(&parts, 150), Some(3));
        // Part 2 was written but never committed, so it is replaced
        assert_eq!(next_part_number(&parts, 100), Some(2));
        assert_eq!(next_part_number(&parts, 0), Some(1));
    }

    #[test]
    fn next_part_rejects_offsets_the_parts_cannot_reach() {
        let parts = [part(1, 100), part(2, 50)];
        assert_eq!(next_part_number(&parts, 120), None);
        assert_eq!(next_part_number(&parts, 200), None);
        assert_eq!(next_part_number(&[part(2, 10)], 10), None);
    }

    #[test]
    fn multipart_key_rejects_malformed_keys() {
        assert!(MultipartKey::parse("no-separator").is_err());
        assert!(MultipartKey::parse("|upload").is_err());
        assert!(MultipartKey::parse("uploads/abc|").is_err());
    }
}
