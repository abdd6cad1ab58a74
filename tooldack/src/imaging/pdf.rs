//! Multi-image PDF assembly.
//!
//! Each input becomes one page whose media box matches the image's pixel size, with the image
//! embedded as a baseline JPEG (`DCTDecode`) drawn across the whole page.

use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};

use super::{DEFAULT_QUALITY, ImagingError, Result, decode, encode_jpeg};

/// Build a PDF with one page per image, in the given order.
pub fn images_to_pdf<B: AsRef<[u8]>>(images: &[B]) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(ImagingError::InvalidParameter("No images to assemble".to_string()));
    }

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for bytes in images {
        kids.push(Object::Reference(add_page(&mut doc, pages_id, bytes.as_ref())?));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| ImagingError::Pdf(e.into()))?;
    tracing::debug!(pages = count, bytes = buf.len(), "Assembled PDF");
    Ok(buf)
}

fn add_page(doc: &mut Document, pages_id: ObjectId, bytes: &[u8]) -> Result<ObjectId> {
    let (image, _) = decode(bytes)?;
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));
    let jpeg = encode_jpeg(&image, DEFAULT_QUALITY)?;

    let image_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false),
    );

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}
