use crate::point::Point;

/// Panorama viewer deep link for a point carrying a `panoId`.
///
/// Heading goes in as stored, pitch as `90 - pitch` (the viewer measures tilt
/// from the nadir). Missing heading or pitch read as 0. Returns `None` when
/// the point has no panorama id.
pub fn street_view_url(point: &Point) -> Option<String> {
    let pano_id = point.attr("panoId")?.to_string();
    if pano_id.is_empty() {
        return None;
    }
    let heading = point.number("heading").unwrap_or(0.0);
    let pitch = point.number("pitch").unwrap_or(0.0);
    let tilt = 90.0 - pitch;
    let (lat, lng) = (point.lat, point.lng);

    Some(format!(
        "https://www.google.com/maps/@{lat},{lng},3a,90y,{heading}h,{tilt}t/data=!3m7!1e1!3m5!1s{pano_id}!2e0!6shttps:%2F%2Fstreetviewpixels-pa.googleapis.com%2Fv1%2Fpanoid%3D{pano_id}%26!7i13312!8i6656"
    ))
}
